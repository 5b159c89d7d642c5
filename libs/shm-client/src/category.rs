use serde::Serialize;
use std::fmt;

/// Display bucket of a raw backend category string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Proxy,
    Vpn,
    WebTariff,
    Web,
    Mysql,
    Mail,
    Hosting,
    Other,
}

const PROXY_MARKERS: [&str; 5] = ["remna", "remnawave", "marzban", "marz", "mz"];
const VPN_PREFIXES: [&str; 3] = ["vpn", "wg", "awg"];

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Proxy => "proxy",
            Category::Vpn => "vpn",
            Category::WebTariff => "web_tariff",
            Category::Web => "web",
            Category::Mysql => "mysql",
            Category::Mail => "mail",
            Category::Hosting => "hosting",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive: proxy markers anywhere, VPN markers as a prefix, then
/// the hosting family by exact name.
pub fn normalize(raw: &str) -> Category {
    let lower = raw.trim().to_ascii_lowercase();

    if PROXY_MARKERS.iter().any(|m| lower.contains(m)) {
        return Category::Proxy;
    }
    if VPN_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return Category::Vpn;
    }
    match lower.as_str() {
        "web_tariff" => Category::WebTariff,
        "web" => Category::Web,
        "mysql" => Category::Mysql,
        "mail" => Category::Mail,
        "hosting" => Category::Hosting,
        _ => Category::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets() {
        assert_eq!(normalize("remnawave-1"), Category::Proxy);
        assert_eq!(normalize("marzban"), Category::Proxy);
        assert_eq!(normalize("wg-eu"), Category::Vpn);
        assert_eq!(normalize("awg_nl"), Category::Vpn);
        assert_eq!(normalize("mail"), Category::Mail);
        assert_eq!(normalize("web_tariff"), Category::WebTariff);
        assert_eq!(normalize("unknown_x"), Category::Other);
        assert_eq!(normalize(""), Category::Other);
    }

    #[test]
    fn case_insensitive_and_stable() {
        assert_eq!(normalize("VPN-DE"), Category::Vpn);
        assert_eq!(normalize("Remna"), Category::Proxy);
        assert_eq!(normalize("MySQL"), Category::Mysql);
        for raw in ["remnawave-1", "wg-eu", "mail", "unknown_x"] {
            assert_eq!(normalize(raw), normalize(raw));
        }
    }

    #[test]
    fn vpn_marker_must_lead() {
        assert_eq!(normalize("my-vpn"), Category::Other);
    }
}
