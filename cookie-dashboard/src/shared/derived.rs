//! Display-ready values derived from a raw snapshot
//!
//! Pure and stateless. Every figure the dashboard animates comes from here.

use super::types::Snapshot;

/// Equity units per cookie
pub const EQUITY_PER_COOKIE: f64 = 1000.0;

/// Derived figures for one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedMetrics {
    pub cookie_count: f64,
    pub equity_in_cookies: f64,
    pub abs_pnl: f64,
    pub total_cookies: f64,
    pub pnl_cookies: f64,
    pub pnl_is_positive: bool,
}

impl DerivedMetrics {
    /// Compute derived figures for a snapshot
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let equity_in_cookies = calc_equity_in_cookies(snapshot.equity);
        let pnl_cookies = snapshot.unrealized_pnl_cookies;
        let abs_pnl = pnl_cookies.abs();

        Self {
            cookie_count: snapshot.cookie_count,
            equity_in_cookies,
            abs_pnl,
            total_cookies: equity_in_cookies + abs_pnl,
            pnl_cookies,
            pnl_is_positive: pnl_cookies >= 0.0,
        }
    }
}

impl From<&Snapshot> for DerivedMetrics {
    fn from(snapshot: &Snapshot) -> Self {
        Self::from_snapshot(snapshot)
    }
}

/// Convert base currency equity to cookies
pub fn calc_equity_in_cookies(equity: f64) -> f64 {
    equity / EQUITY_PER_COOKIE
}

/// Window/terminal title for a cookie count
pub fn format_title(cookie_count: f64) -> String {
    format!("{:.2} cookies", cookie_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_losing_position() {
        let snapshot = Snapshot {
            equity: 1000.0,
            unrealized_pnl_cookies: -50.0,
            ..Default::default()
        };
        let derived = DerivedMetrics::from_snapshot(&snapshot);

        assert_eq!(derived.equity_in_cookies, 1.0);
        assert_eq!(derived.abs_pnl, 50.0);
        assert_eq!(derived.total_cookies, 51.0);
        assert_eq!(derived.pnl_cookies, -50.0);
        assert!(!derived.pnl_is_positive);
    }

    #[test]
    fn test_flat_pnl_counts_as_positive() {
        let snapshot = Snapshot {
            cookie_count: 12.0,
            equity: 12_500.0,
            ..Default::default()
        };
        let derived = DerivedMetrics::from(&snapshot);

        assert_eq!(derived.cookie_count, 12.0);
        assert!((derived.total_cookies - 12.5).abs() < 1e-12);
        assert!(derived.pnl_is_positive);
    }

    #[test]
    fn test_format_title() {
        assert_eq!(format_title(42.5), "42.50 cookies");
        assert_eq!(format_title(0.0), "0.00 cookies");
        assert_eq!(format_title(1.005_1), "1.01 cookies");
    }
}
