use anyhow::Result;
use tracing::warn;

use crate::params::ConfigDelta;
use crate::SupervisorConfig;

/// PX4 drops out of OFFBOARD when setpoints arrive slower than this.
pub const MIN_OFFBOARD_HZ: f64 = 2.0;

pub fn check_rate(rate_hz: f64) -> Result<()> {
    anyhow::ensure!(rate_hz.is_finite(), "supervisor.rate_hz must be finite");
    anyhow::ensure!(
        rate_hz > MIN_OFFBOARD_HZ,
        "supervisor.rate_hz {} too low for offboard streaming (> {} Hz)",
        rate_hz,
        MIN_OFFBOARD_HZ
    );
    anyhow::ensure!(rate_hz <= 500.0, "supervisor.rate_hz {} unreasonably high", rate_hz);
    Ok(())
}

/// Sanity-check the bounds in the initial parameters. The store itself
/// accepts anything; this only catches config files that would make every
/// position read as outside the envelope.
pub fn check_bounds(params: Option<&ConfigDelta>) -> Result<()> {
    let Some(p) = params else {
        warn!("no supervisor.params: bounds default to zero and every pose is outside the envelope");
        return Ok(());
    };

    if let (Some(max), Some(min)) = (p.safe_x_max, p.safe_x_min) {
        anyhow::ensure!(min < max, "safe_x_min ({}) must be below safe_x_max ({})", min, max);
    }
    if let (Some(max), Some(min)) = (p.safe_y_max, p.safe_y_min) {
        anyhow::ensure!(min < max, "safe_y_min ({}) must be below safe_y_max ({})", min, max);
    }
    if let Some(z_max) = p.safe_z_max {
        anyhow::ensure!(z_max > 0.0, "safe_z_max ({}) must be above the ground", z_max);
    }
    if p.safe_z_min.is_some() {
        warn!("safe_z_min is accepted but not enforced by the envelope check");
    }
    Ok(())
}

pub fn check_supervisor(cfg: &SupervisorConfig) -> Result<()> {
    check_rate(cfg.rate_hz())?;
    check_bounds(cfg.params.as_ref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits() {
        assert!(check_rate(50.0).is_ok());
        assert!(check_rate(1.0).is_err());
        assert!(check_rate(2.0).is_err());
        assert!(check_rate(f64::NAN).is_err());
    }

    #[test]
    fn inverted_bounds_are_flagged() {
        let p = ConfigDelta { safe_x_max: Some(-1.0), safe_x_min: Some(1.0), ..Default::default() };
        assert!(check_bounds(Some(&p)).is_err());
    }

    #[test]
    fn supervisor_section_from_toml() {
        let cfg: SupervisorConfig = toml::from_str(
            r#"
            rate_hz = 50.0
            [params]
            safe_x_max = 2.0
            safe_x_min = -2.0
            safe_y_max = 2.0
            safe_y_min = -2.0
            safe_z_max = 2.5
            thrust = 0.35
            "#,
        )
        .unwrap();
        assert!(check_supervisor(&cfg).is_ok());
        assert_eq!(cfg.marker(), [0.0, 0.0, 0.05]);
        assert_eq!(cfg.params.unwrap().thrust, Some(0.35));
    }
}
