//! Harness scenarios: one problem run under one discipline.

use rendezvous_core::{Discipline, Problem};
use serde::Serialize;

/// A problem × discipline combination the engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Scenario {
    pub problem: Problem,
    pub discipline: Discipline,
}

impl Scenario {
    /// Returns every supported combination, problem by problem.
    pub fn all() -> Vec<Scenario> {
        Self::matching(None, None)
    }

    /// Returns the supported combinations matching the filters; `None`
    /// matches everything.
    pub fn matching(problem: Option<Problem>, discipline: Option<Discipline>) -> Vec<Scenario> {
        Problem::all()
            .into_iter()
            .filter(|p| problem.map_or(true, |wanted| *p == wanted))
            .flat_map(|p| {
                p.disciplines()
                    .into_iter()
                    .map(move |d| Scenario { problem: p, discipline: d })
            })
            .filter(|s| discipline.map_or(true, |wanted| s.discipline == wanted))
            .collect()
    }

    /// Returns the scenario name, e.g. `dining_philosophers/monitor`.
    pub fn name(&self) -> String {
        format!("{}/{}", self.problem, self.discipline)
    }

    /// False for the deadlock demonstration, which must never progress.
    pub fn expects_progress(&self) -> bool {
        self.discipline != Discipline::Deadlock
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.problem, self.discipline)
    }
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (problem, discipline) = s
            .split_once('/')
            .ok_or_else(|| format!("Expected <problem>/<discipline>, got: {}", s))?;
        let scenario = Scenario {
            problem: problem.parse()?,
            discipline: discipline.parse()?,
        };
        if !scenario.problem.supports(scenario.discipline) {
            return Err(format!("{} does not support {}", scenario.problem, scenario.discipline));
        }
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_scenarios() {
        let all = Scenario::all();
        // Four disciplines for each of six problems, plus the deadlock demo
        assert_eq!(all.len(), 25);
        assert_eq!(all.iter().filter(|s| !s.expects_progress()).count(), 1);
    }

    #[test]
    fn test_filters() {
        let dining = Scenario::matching(Some(Problem::DiningPhilosophers), None);
        assert_eq!(dining.len(), 5);

        let monitors = Scenario::matching(None, Some(Discipline::Monitor));
        assert_eq!(monitors.len(), 6);

        assert!(Scenario::matching(Some(Problem::SleepingBarber), Some(Discipline::Deadlock)).is_empty());
    }

    #[test]
    fn test_scenario_parse() {
        let s: Scenario = "dining/deadlock".parse().unwrap();
        assert_eq!(s.problem, Problem::DiningPhilosophers);
        assert_eq!(s.discipline, Discipline::Deadlock);
        assert_eq!(s.name(), "dining_philosophers/deadlock");
        assert!("barber/deadlock".parse::<Scenario>().is_err());
        assert!("barber".parse::<Scenario>().is_err());
    }
}
