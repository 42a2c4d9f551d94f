use crate::{print_error, print_info, print_success, ConfigCommands};
use colored::*;
use darkpay_core::{RewardsConfig, NUMERATOR_DENOMINATOR};
use std::path::Path;

pub fn handle(action: ConfigCommands) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigCommands::Init {
            output,
            owner,
            community_fund,
        } => init(&output, &owner, &community_fund)?,
        ConfigCommands::Check { path } => check(&path)?,
    }
    Ok(())
}

fn init(output: &Path, owner: &str, community_fund: &str) -> Result<(), Box<dyn std::error::Error>> {
    if output.exists() {
        print_error(&format!("{} already exists!", output.display()));
        return Ok(());
    }
    let config = RewardsConfig::new(owner, community_fund);
    config.validate()?;
    config.save_to_file(output)?;
    print_success(&format!("Config written to {}", output.display()));
    show(&config);
    Ok(())
}

fn check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match RewardsConfig::load_from_file(path) {
        Ok(config) => {
            print_success(&format!("{} is valid", path.display()));
            show(&config);
            Ok(())
        }
        Err(e) => {
            print_error(&format!("{}: {}", path.display(), e));
            Err(e.into())
        }
    }
}

fn percent(numerator: u64) -> String {
    format!(
        "{}.{:04}%",
        numerator * 100 / NUMERATOR_DENOMINATOR,
        (numerator * 100 % NUMERATOR_DENOMINATOR) / 100
    )
}

pub(crate) fn show(config: &RewardsConfig) {
    print_info(&format!("owner:            {}", config.owner.bold()));
    print_info(&format!("community fund:   {}", config.community_fund.bold()));
    print_info(&format!(
        "community share:  {} ({})",
        config.community_fund_numerator,
        percent(config.community_fund_numerator)
    ));
    print_info(&format!(
        "withheld / unit:  {} ({})",
        config.hourly_withheld_numerator,
        percent(config.hourly_withheld_numerator)
    ));
    print_info(&format!(
        "cycle unit:       {}s (min interval {}s)",
        config.cycle_unit_secs, config.minimum_cycle_interval_secs
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_percent_formatting() {
        assert_eq!(percent(50_000), "5.0000%");
        assert_eq!(percent(999_000), "99.9000%");
        assert_eq!(percent(1_000_000), "100.0000%");
        assert_eq!(percent(1), "0.0001%");
    }

    #[test]
    fn test_init_then_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("darkpay.toml");
        init(&path, "admin", "fund").unwrap();
        assert!(path.exists());
        check(&path).unwrap();
    }

    #[test]
    fn test_check_rejects_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "owner = \"admin\"\ncommunity_fund = \"0x0\"\n").unwrap();
        assert!(check(&path).is_err());
    }
}
