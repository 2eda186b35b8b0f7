//! Work items for each launcher mode.

use crate::Command;
use scout_core::{Company, TargetsConfig, WorkItem};

/// Items planned for `command`, in company-then-state order.
///
/// `specific` falls back to the configured targets for whichever of
/// companies or states was not given on the command line.
pub fn work_items(command: &Command, targets: &TargetsConfig) -> Vec<WorkItem> {
    match command {
        Command::Test | Command::Captcha => vec![WorkItem::new(Company::Ubs, "New York")],
        Command::Discover | Command::Full => cross(&targets.companies, &targets.states),
        Command::Specific { companies, states } => {
            let companies = if companies.is_empty() {
                &targets.companies
            } else {
                companies
            };
            let states = if states.is_empty() {
                &targets.states
            } else {
                states
            };
            cross(companies, states)
        }
    }
}

fn cross(companies: &[Company], states: &[String]) -> Vec<WorkItem> {
    companies
        .iter()
        .flat_map(|company| {
            states
                .iter()
                .filter(|state| !state.trim().is_empty())
                .map(move |state| WorkItem::new(*company, state.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_mode_is_single_item() {
        let items = work_items(&Command::Test, &TargetsConfig::default());
        assert_eq!(items, vec![WorkItem::new(Company::Ubs, "New York")]);
        assert_eq!(work_items(&Command::Captcha, &TargetsConfig::default()), items);
    }

    #[test]
    fn test_full_mode_crosses_targets() {
        let targets = TargetsConfig::default();
        let items = work_items(&Command::Full, &targets);
        assert_eq!(items.len(), targets.companies.len() * targets.states.len());
        assert_eq!(items[0], WorkItem::new(Company::Ubs, "New York"));
    }

    #[test]
    fn test_specific_falls_back_to_targets() {
        let targets = TargetsConfig {
            companies: vec![Company::Ubs, Company::MerrillLynch],
            states: vec!["Ohio".to_string(), " ".to_string()],
        };
        let only_state = Command::Specific {
            companies: vec![],
            states: vec!["Texas".to_string()],
        };
        assert_eq!(
            work_items(&only_state, &targets),
            vec![
                WorkItem::new(Company::Ubs, "Texas"),
                WorkItem::new(Company::MerrillLynch, "Texas"),
            ]
        );

        let only_company = Command::Specific {
            companies: vec![Company::MorganStanley],
            states: vec![],
        };
        assert_eq!(
            work_items(&only_company, &targets),
            vec![WorkItem::new(Company::MorganStanley, "Ohio")]
        );
    }
}
