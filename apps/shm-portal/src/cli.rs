use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "shm-portal")]
#[command(about = "Self-service portal for SHM hosting and VPN billing", long_about = None)]
pub struct Cli {
    /// Config file (TOML); defaults to /etc/shm-portal/portal.toml or ./portal.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Landing URL the portal was opened with; a `partner_id` in it is remembered
    #[arg(long, global = true)]
    pub landing_url: Option<String>,

    /// Init payload of the embedding Telegram Mini App
    #[arg(long, global = true, env = "SHM_TELEGRAM_INIT_DATA", hide_env_values = true)]
    pub init_data: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with login and password
    Login {
        login: Option<String>,
    },
    /// Create an account (does not sign in)
    Register {
        login: Option<String>,
    },
    /// Sign out and forget the session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Register a login widget callback and feed it an assertion
    TelegramWidget {
        /// Assertion JSON as produced by the widget; read from stdin when omitted
        #[arg(long)]
        assertion: Option<String>,
    },
    /// List services available for ordering
    Catalog,
    /// Order a service, topping up the balance first if needed
    Order {
        service_id: u64,
        /// Payment system used when the balance is short
        #[arg(long)]
        pay_system: Option<String>,
        /// Top-up amount; never below the missing balance
        #[arg(long)]
        amount: Option<f64>,
    },
    /// List owned services
    Services {
        /// Keep refreshing while services are in progress or unpaid, until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// Stop an active service
    Stop {
        user_service_id: u64,
    },
    /// Delete a blocked, unpaid or failed service
    Delete {
        user_service_id: u64,
        /// Skip confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Show connection details of a VPN or proxy service
    Connection {
        user_service_id: u64,
        /// Write the VPN config to vpn{ID}.conf in this directory
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Payment history
    Payments,
    /// Available payment systems
    PaySystems,
    /// Upcoming charges
    Forecast,
    /// Open a payment form to top up the balance
    TopUp {
        pay_system: String,
        amount: f64,
    },
    /// Remove a saved autopayment
    AutopaymentDelete {
        pay_system: String,
    },
    /// Promo codes
    Promo {
        #[command(subcommand)]
        action: PromoAction,
    },
    /// Change password
    Passwd,
    /// Show or update the profile
    Profile {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Show the navigation menu for the current layout
    Menu,
}

#[derive(Subcommand)]
pub enum PromoAction {
    /// Apply a promo code
    Apply { code: String },
    /// List applied promo codes
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "shm-portal",
            "order",
            "42",
            "--pay-system",
            "yookassa",
            "--landing-url",
            "https://portal.example.com/?partner_id=7",
        ])
        .unwrap();

        assert_eq!(cli.landing_url.as_deref(), Some("https://portal.example.com/?partner_id=7"));
        match cli.command {
            Commands::Order { service_id, pay_system, amount } => {
                assert_eq!(service_id, 42);
                assert_eq!(pay_system.as_deref(), Some("yookassa"));
                assert_eq!(amount, None);
            }
            _ => panic!("expected order"),
        }
    }

    #[test]
    fn promo_requires_action() {
        assert!(Cli::try_parse_from(["shm-portal", "promo"]).is_err());
    }
}
