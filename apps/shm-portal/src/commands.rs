use anyhow::{Context, Result, anyhow, bail};
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password, Select};
use shm_client::models::ProfileUpdate;
use shm_client::owned::{ConnectionArtifact, config_file_name};
use shm_client::widget::{WidgetAssertion, WidgetEvent};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::cli::{Commands, PromoAction};
use crate::render;
use crate::shell::Shell;

const WATCH_TICK: Duration = Duration::from_millis(500);

pub async fn run(shell: &mut Shell, command: Commands) -> Result<()> {
    match command {
        Commands::Login { login } => login_cmd(shell, login).await,
        Commands::Register { login } => register(shell, login).await,
        Commands::TelegramWidget { assertion } => telegram_widget(shell, assertion).await,
        Commands::Menu => {
            render::menu(&shell.store.snapshot(), shell.layout);
            Ok(())
        }
        Commands::Logout => {
            shell.auth.logout();
            println!("Signed out.");
            Ok(())
        }
        command => {
            if !shell.auth.is_authenticated() {
                bail!("Not signed in. Run `shm-portal login` first");
            }
            shell.header();
            authenticated(shell, command).await
        }
    }
}

async fn authenticated(shell: &mut Shell, command: Commands) -> Result<()> {
    match command {
        Commands::Whoami => {
            let state = shell.store.snapshot();
            if let Some(user) = &state.user {
                render::user(user, state.telegram_photo.as_deref());
            }
        }
        Commands::Catalog => {
            shell.ordering.list_orderable().await;
            render::catalog(&shell.ordering.grouped(), shell.ordering.snapshot().balance);
        }
        Commands::Order {
            service_id,
            pay_system,
            amount,
        } => order(shell, service_id, pay_system, amount).await?,
        Commands::Services { watch } => {
            shell.owned.fetch(false).await;
            render::services(&shell.owned.grouped());
            if watch {
                watch_services(shell).await?;
            }
        }
        Commands::Stop { user_service_id } => {
            shell.owned.fetch(false).await;
            if shell.owned.stop(user_service_id).await {
                render::services(&shell.owned.grouped());
            }
        }
        Commands::Delete { user_service_id, yes } => {
            shell.owned.fetch(false).await;
            let confirmed = yes
                || Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt(format!("Delete service #{}?", user_service_id))
                    .default(false)
                    .interact()?;
            if confirmed && shell.owned.delete(user_service_id).await {
                render::services(&shell.owned.grouped());
            }
        }
        Commands::Connection {
            user_service_id,
            save,
        } => connection(shell, user_service_id, save.as_deref()).await?,
        Commands::Payments => render::payments(&shell.account.payments().await),
        Commands::PaySystems => render::pay_systems(&shell.account.pay_systems().await),
        Commands::Forecast => {
            if let Some(forecast) = shell.account.forecast().await {
                render::forecast(&forecast);
            }
        }
        Commands::TopUp { pay_system, amount } => {
            let systems = shell.account.pay_systems().await;
            let system = systems
                .iter()
                .find(|ps| ps.name == pay_system)
                .ok_or_else(|| anyhow!("Unknown payment system {}", pay_system))?;
            shell.account.top_up(system, amount);
        }
        Commands::AutopaymentDelete { pay_system } => {
            shell.account.delete_autopayment(&pay_system).await;
        }
        Commands::Promo { action } => match action {
            PromoAction::Apply { code } => {
                shell.account.apply_promo(&code).await;
            }
            PromoAction::List => render::promos(&shell.account.promos().await),
        },
        Commands::Passwd => {
            let theme = ColorfulTheme::default();
            let password = Password::with_theme(&theme)
                .with_prompt("New password")
                .allow_empty_password(true)
                .interact()?;
            let confirmation = Password::with_theme(&theme)
                .with_prompt("Repeat password")
                .allow_empty_password(true)
                .interact()?;
            shell.account.change_password(&password, &confirmation).await;
        }
        Commands::Profile { full_name, phone } => {
            let update = ProfileUpdate { full_name, phone };
            let user = if update.is_empty() {
                shell.account.profile().await
            } else {
                shell.account.update_profile(&update).await
            };
            if let Some(user) = user {
                render::user(&user, shell.store.snapshot().telegram_photo.as_deref());
            }
        }
        Commands::Login { .. }
        | Commands::Register { .. }
        | Commands::TelegramWidget { .. }
        | Commands::Menu
        | Commands::Logout => unreachable!("handled before the session check"),
    }
    Ok(())
}

fn prompt_login(login: Option<String>) -> Result<String> {
    if let Some(login) = login.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) {
        return Ok(login);
    }
    Ok(Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt("Login")
        .interact_text()?
        .trim()
        .to_string())
}

async fn login_cmd(shell: &mut Shell, login: Option<String>) -> Result<()> {
    if let Some(user) = shell.store.user() {
        println!("Already signed in as {}.", user.display_name());
        return Ok(());
    }

    let login = prompt_login(login)?;
    let password = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Password")
        .allow_empty_password(true)
        .interact()?;

    if shell.auth.login(&login, &password).await {
        shell.header();
    }
    Ok(())
}

async fn register(shell: &mut Shell, login: Option<String>) -> Result<()> {
    let theme = ColorfulTheme::default();
    let login = prompt_login(login)?;
    let password = Password::with_theme(&theme)
        .with_prompt("Password")
        .allow_empty_password(true)
        .interact()?;
    let confirmation = Password::with_theme(&theme)
        .with_prompt("Repeat password")
        .allow_empty_password(true)
        .interact()?;

    if shell.auth.register(&login, &password, &confirmation).await {
        println!("Now sign in with `shm-portal login {}`.", login);
    }
    Ok(())
}

async fn telegram_widget(shell: &mut Shell, assertion: Option<String>) -> Result<()> {
    if !shell.telegram.widget_allowed(shell.host.as_ref()) {
        bail!("Telegram login widget is not available here");
    }
    let bot_name = shell.telegram.bot_name.clone().unwrap_or_default();

    let (registration, mut events) = shell.bridge.register();
    println!("{}", style("Embed this to render the login button:").bold());
    println!("{}", registration.script_tag(&bot_name));

    let raw = match assertion {
        Some(raw) => raw,
        None => {
            println!("Paste the assertion JSON, then end input (Ctrl-D):");
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read assertion")?;
            raw
        }
    };
    let assertion: WidgetAssertion =
        serde_json::from_str(raw.trim()).context("Malformed widget assertion")?;

    if !shell.bridge.dispatch(registration.name(), assertion) {
        bail!("Widget callback {} is no longer registered", registration.name());
    }
    drop(registration);

    if let Some(WidgetEvent::Authorized(assertion)) = events.recv().await {
        if shell.auth.widget_auth(&assertion).await {
            shell.header();
        }
    }
    Ok(())
}

async fn order(
    shell: &mut Shell,
    service_id: u64,
    pay_system: Option<String>,
    amount: Option<f64>,
) -> Result<()> {
    shell.ordering.list_orderable().await;
    let service = shell
        .ordering
        .find(service_id)
        .ok_or_else(|| anyhow!("Service #{} is not available for ordering", service_id))?;

    shell.ordering.select_service(service).await;
    let state = shell.ordering.snapshot();
    if !state.needs_top_up() {
        shell.ordering.order().await;
        return Ok(());
    }

    println!(
        "Balance {:.2} is short, at least {} must be paid.",
        state.balance,
        style(format!("{:.2}", state.min_top_up())).yellow()
    );
    if state.pay_systems.is_empty() {
        shell.ordering.clear_selection();
        return Ok(());
    }

    match pay_system {
        Some(name) => {
            if !shell.ordering.select_pay_system(&name) {
                bail!("Unknown payment system {}", name);
            }
        }
        None if state.pay_systems.len() > 1 => {
            let labels: Vec<&str> = state.pay_systems.iter().map(|ps| ps.label()).collect();
            let index = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Payment system")
                .items(&labels)
                .default(0)
                .interact()?;
            shell.ordering.select_pay_system(&state.pay_systems[index].name);
        }
        None => {}
    }

    if let Some(amount) = amount {
        let applied = shell.ordering.set_pay_amount(amount);
        info!("Paying {:.2} (requested {:.2})", applied, amount);
    }
    shell.ordering.order_and_pay().await;
    Ok(())
}

async fn watch_services(shell: &mut Shell) -> Result<()> {
    println!("{}", style("Watching services, Ctrl-C to stop").dim());
    let mut last = shell.owned.services();
    let mut ticker = tokio::time::interval(WATCH_TICK);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {
                shell.flush_notices();
                let current = shell.owned.services();
                if current != last {
                    println!();
                    render::services(&shell.owned.grouped());
                    last = current;
                }
            }
        }
    }

    shell.owned.shutdown();
    Ok(())
}

async fn connection(shell: &mut Shell, user_service_id: u64, save: Option<&Path>) -> Result<()> {
    shell.owned.fetch(false).await;
    let service = shell
        .owned
        .find(user_service_id)
        .ok_or_else(|| anyhow!("Service #{} not found", user_service_id))?;

    match shell.owned.connection(&service).await {
        Some(ConnectionArtifact::VpnConfig(config)) => match save {
            Some(dir) => {
                let path = dir.join(config_file_name(user_service_id));
                std::fs::write(&path, &config)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Saved {}", style(path.display()).green());
            }
            None => print!("{}", config),
        },
        Some(ConnectionArtifact::Subscription(url)) => {
            println!("{} {}", style("Subscription:").bold(), url);
        }
        None => println!("No connection details for service #{}.", user_service_id),
    }
    Ok(())
}
