use console::style;
use shm_client::category::Category;
use shm_client::models::{
    Forecast, OrderableService, OwnedService, PaySystem, Payment, Promo, ServiceStatus, User,
};
use shm_client::notify::{Level, Notice};
use shm_client::state::AppState;
use std::collections::BTreeMap;

use crate::shell::Layout;

pub fn notice(notice: &Notice) {
    match notice.level {
        Level::Success => println!("{} {}", style("✔").green().bold(), style(&notice.message).green()),
        Level::Error => eprintln!("{} {}", style("✖").red().bold(), style(&notice.message).red()),
    }
}

pub fn header(app_name: &str, layout: Layout, user: Option<&User>) {
    if layout == Layout::Sidebar {
        let who = user.map(User::display_name).unwrap_or("guest");
        println!("{}  {}", style(app_name).bold().blue(), style(who).dim());
        println!("{}", style("=".repeat(40)).blue());
    }
}

pub fn user(user: &User, photo: Option<&str>) {
    println!("{}", style(user.display_name()).bold());
    println!("  Login:    {}", user.login);
    println!("  ID:       {}", user.user_id);
    if let Some(phone) = &user.phone {
        println!("  Phone:    {}", phone);
    }
    println!("  Balance:  {}", style(format!("{:.2}", user.balance)).green());
    if let Some(bonus) = user.bonus.filter(|b| *b != 0.0) {
        println!("  Bonus:    {:.2}", bonus);
    }
    if let Some(credit) = user.credit.filter(|c| *c != 0.0) {
        println!("  Credit:   {:.2}", credit);
    }
    if let Some(discount) = user.discount.filter(|d| *d != 0.0) {
        println!("  Discount: {}%", discount);
    }
    if let Some(photo) = photo {
        println!("  Photo:    {}", style(photo).dim());
    }
}

pub fn catalog(groups: &BTreeMap<Category, Vec<OrderableService>>, balance: f64) {
    if groups.is_empty() {
        println!("No services available for ordering.");
        return;
    }
    println!("Balance: {}", style(format!("{:.2}", balance)).green());
    for (category, services) in groups {
        println!();
        println!("{}", style(category_title(*category)).bold().cyan());
        for service in services {
            let cost = format!("{:.2}", service.cost);
            let cost = if service.cost > balance {
                style(cost).yellow()
            } else {
                style(cost).green()
            };
            println!(
                "  #{:<6} {:<32} {} / {} mo",
                service.service_id, service.name, cost, service.period
            );
            if let Some(descr) = service.descr.as_deref().filter(|d| !d.trim().is_empty()) {
                println!("          {}", style(descr).dim());
            }
        }
    }
}

pub fn services(groups: &BTreeMap<Category, Vec<OwnedService>>) {
    if groups.is_empty() {
        println!("You have no services yet.");
        return;
    }
    for (category, roots) in groups {
        println!("{}", style(category_title(*category)).bold().cyan());
        for service in roots {
            service_line(service, 1);
        }
    }
}

fn service_line(service: &OwnedService, depth: usize) {
    let expire = service
        .expires()
        .map(|at| format!("until {}", at.format("%Y-%m-%d")))
        .unwrap_or_default();
    println!(
        "{}#{:<6} {:<32} {} {}",
        "  ".repeat(depth),
        service.user_service_id,
        service.display_name(),
        status(&service.status),
        style(expire).dim()
    );
    for child in &service.children {
        service_line(child, depth + 1);
    }
}

fn status(status: &ServiceStatus) -> console::StyledObject<String> {
    let label = status.to_string();
    match status {
        ServiceStatus::Active => style(label).green(),
        ServiceStatus::NotPaid | ServiceStatus::Progress | ServiceStatus::Init => style(label).yellow(),
        ServiceStatus::Block | ServiceStatus::Error => style(label).red(),
        ServiceStatus::Unknown(_) => style(label).dim(),
    }
}

fn category_title(category: Category) -> &'static str {
    match category {
        Category::Proxy => "Proxy",
        Category::Vpn => "VPN",
        Category::WebTariff => "Web hosting plans",
        Category::Web => "Web",
        Category::Mysql => "MySQL",
        Category::Mail => "Mail",
        Category::Hosting => "Hosting",
        Category::Other => "Other",
    }
}

pub fn payments(payments: &[Payment]) {
    if payments.is_empty() {
        println!("No payments yet.");
        return;
    }
    for payment in payments {
        println!(
            "{:<20} {:>10} {}",
            payment.date.as_deref().unwrap_or("-"),
            style(format!("{:.2}", payment.money)).green(),
            payment.pay_system_id.as_deref().unwrap_or("-")
        );
    }
}

pub fn pay_systems(systems: &[PaySystem]) {
    if systems.is_empty() {
        println!("No payment systems available.");
        return;
    }
    for system in systems {
        let recurring = if system.recurring.as_ref().is_some_and(|r| !r.is_null()) {
            style(" (autopayment)").dim().to_string()
        } else {
            String::new()
        };
        println!("  {:<20} {}{}", system.name, system.label(), recurring);
    }
}

pub fn forecast(forecast: &Forecast) {
    for item in &forecast.items {
        println!(
            "  {:<32} {:>10.2} {}",
            item.name.as_deref().unwrap_or("-"),
            item.total,
            item.expire.as_deref().unwrap_or("")
        );
    }
    if forecast.dept != 0.0 {
        println!("  {:<32} {:>10.2}", "Debt", forecast.dept);
    }
    println!("{} {:.2}", style("Total:").bold(), forecast.total);
}

pub fn promos(promos: &[Promo]) {
    if promos.is_empty() {
        println!("No promo codes applied.");
        return;
    }
    for promo in promos {
        println!("  {}", promo.code.as_deref().unwrap_or("-"));
    }
}

pub fn menu(state: &AppState, layout: Layout) {
    let title = match layout {
        Layout::BottomNavigation => "Bottom navigation",
        Layout::Sidebar => "Sidebar",
    };
    println!("{}", style(title).bold());
    for item in state.enabled_menu() {
        println!("  {:<14} {}", item.path, item.label);
    }
}
