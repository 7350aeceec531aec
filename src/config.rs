// src/config.rs
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;

/// Flat rules of thumb the return calculator applies. Overridable through the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnAssumptions {
    /// Residential operating expenses as a share of EGI.
    pub opex_ratio: f64,
    pub hotel_noi_margin: f64,
    /// Percent of gross exit value, 2.5 means 2.5%.
    pub sale_cost_pct: f64,
    /// Share of LP profit given up to the GP promote.
    pub promote_haircut: f64,
    pub avg_unit_sf: f64,
}

impl Default for ReturnAssumptions {
    fn default() -> Self {
        ReturnAssumptions {
            opex_ratio: 0.35,
            hotel_noi_margin: 0.35,
            sale_cost_pct: 2.5,
            promote_haircut: 0.20,
            avg_unit_sf: 900.0,
        }
    }
}

impl ReturnAssumptions {
    pub fn from_env() -> Self {
        let defaults = ReturnAssumptions::default();
        let assumptions = ReturnAssumptions {
            opex_ratio: env_f64("FAILLON_OPEX_RATIO", defaults.opex_ratio),
            hotel_noi_margin: env_f64("FAILLON_HOTEL_NOI_MARGIN", defaults.hotel_noi_margin),
            sale_cost_pct: env_f64("FAILLON_SALE_COST_PCT", defaults.sale_cost_pct),
            promote_haircut: env_f64("FAILLON_PROMOTE_HAIRCUT", defaults.promote_haircut),
            avg_unit_sf: env_f64("FAILLON_AVG_UNIT_SF", defaults.avg_unit_sf),
        };
        info!("Return assumptions: {:?}", assumptions);
        assumptions
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => v,
            _ => {
                warn!(
                    "${} is not a valid non-negative number ({:?}), using {}",
                    name, raw, default
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// Port to bind, from `$PORT` (3030 when unset or invalid).
pub fn port_from_env() -> u16 {
    let port_str = env::var("PORT").unwrap_or_else(|_| {
        warn!("$PORT not set, defaulting to 3030");
        "3030".to_string()
    });

    port_str.parse().unwrap_or_else(|_| {
        warn!("$PORT is not a number ({}), defaulting to 3030", port_str);
        3030
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_env_value_falls_back() {
        env::set_var("FAILLON_TEST_BAD_RATIO", "lots");
        assert_eq!(env_f64("FAILLON_TEST_BAD_RATIO", 0.35), 0.35);
        env::set_var("FAILLON_TEST_GOOD_RATIO", " 0.4 ");
        assert_eq!(env_f64("FAILLON_TEST_GOOD_RATIO", 0.35), 0.4);
        assert_eq!(env_f64("FAILLON_TEST_UNSET_RATIO", 900.0), 900.0);
    }
}
