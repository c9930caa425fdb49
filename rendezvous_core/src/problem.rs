//! Problem and discipline identifiers.

use serde::{Deserialize, Serialize};

/// The classic coordination problems the engine can simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Problem {
    /// Producers and consumers around a bounded tank
    BoundedBuffer,

    /// Concurrent readers, exclusive writers
    ReadersWriters,

    /// Philosophers sharing forks around a round table
    DiningPhilosophers,

    /// One barber, a chair and a row of waiting seats
    SleepingBarber,

    /// An agent placing ingredient pairs for three smokers
    CigaretteSmokers,

    /// Prioritised requests competing for assistants and bucket tokens
    VirtualAssistants,
}

impl Problem {
    /// Returns a list of all problems.
    pub fn all() -> Vec<Problem> {
        vec![
            Problem::BoundedBuffer,
            Problem::ReadersWriters,
            Problem::DiningPhilosophers,
            Problem::SleepingBarber,
            Problem::CigaretteSmokers,
            Problem::VirtualAssistants,
        ]
    }

    /// Returns the problem name.
    pub fn name(&self) -> &'static str {
        match self {
            Problem::BoundedBuffer => "bounded_buffer",
            Problem::ReadersWriters => "readers_writers",
            Problem::DiningPhilosophers => "dining_philosophers",
            Problem::SleepingBarber => "sleeping_barber",
            Problem::CigaretteSmokers => "cigarette_smokers",
            Problem::VirtualAssistants => "virtual_assistants",
        }
    }

    /// Returns a description of the problem.
    pub fn description(&self) -> &'static str {
        match self {
            Problem::BoundedBuffer => "Producers fill and consumers drain a tank of fixed capacity",
            Problem::ReadersWriters => "Readers share the record, writers need it alone",
            Problem::DiningPhilosophers => "Five philosophers, five forks, two forks per meal",
            Problem::SleepingBarber => "Customers take waiting seats or leave; the barber naps when idle",
            Problem::CigaretteSmokers => "An agent lays out two ingredients; the smoker with the third rolls",
            Problem::VirtualAssistants => "Requests need a token and a free assistant; high priority goes first",
        }
    }

    /// Returns the disciplines that have a strategy for this problem.
    pub fn disciplines(&self) -> Vec<Discipline> {
        let mut supported = vec![
            Discipline::Mutex,
            Discipline::Semaphore,
            Discipline::Monitor,
            Discipline::Barrier,
        ];
        if *self == Problem::DiningPhilosophers {
            supported.push(Discipline::Deadlock);
        }
        supported
    }

    /// Returns true if `discipline` has a strategy for this problem.
    pub fn supports(&self, discipline: Discipline) -> bool {
        self.disciplines().contains(&discipline)
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Problem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bounded_buffer" | "buffer" | "producer_consumer" => Ok(Problem::BoundedBuffer),
            "readers_writers" | "rw" => Ok(Problem::ReadersWriters),
            "dining_philosophers" | "dining" | "philosophers" => Ok(Problem::DiningPhilosophers),
            "sleeping_barber" | "barber" => Ok(Problem::SleepingBarber),
            "cigarette_smokers" | "smokers" => Ok(Problem::CigaretteSmokers),
            "virtual_assistants" | "assistants" => Ok(Problem::VirtualAssistants),
            _ => Err(format!("Unknown problem: {}", s)),
        }
    }
}

/// A coordination discipline, i.e. the family of primitives a strategy uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    /// One exclusive lock, predicate re-tested after a delay (busy-wait)
    Mutex,

    /// Counting semaphores plus an optional binary guard
    Semaphore,

    /// One lock with condition variables
    Monitor,

    /// Fixed-party rendezvous barrier with an auxiliary lock
    Barrier,

    /// Left-fork-first with a rendezvous that guarantees circular wait
    Deadlock,
}

impl Discipline {
    /// Returns a list of all disciplines.
    pub fn all() -> Vec<Discipline> {
        vec![
            Discipline::Mutex,
            Discipline::Semaphore,
            Discipline::Monitor,
            Discipline::Barrier,
            Discipline::Deadlock,
        ]
    }

    /// Returns the discipline name.
    pub fn name(&self) -> &'static str {
        match self {
            Discipline::Mutex => "mutex",
            Discipline::Semaphore => "semaphore",
            Discipline::Monitor => "monitor",
            Discipline::Barrier => "barrier",
            Discipline::Deadlock => "deadlock",
        }
    }

    /// Returns true for disciplines that promise every requester eventually
    /// gets through.
    pub fn guarantees_progress(&self) -> bool {
        matches!(self, Discipline::Semaphore | Discipline::Monitor)
    }
}

impl std::fmt::Display for Discipline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Discipline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mutex" | "busy_wait" | "spin" => Ok(Discipline::Mutex),
            "semaphore" | "sem" => Ok(Discipline::Semaphore),
            "monitor" | "condvar" | "hoare" => Ok(Discipline::Monitor),
            "barrier" => Ok(Discipline::Barrier),
            "deadlock" => Ok(Discipline::Deadlock),
            _ => Err(format!("Unknown discipline: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_round_trips_through_name() {
        for problem in Problem::all() {
            assert_eq!(problem.name().parse::<Problem>(), Ok(problem));
        }
        assert!("towers_of_hanoi".parse::<Problem>().is_err());
    }

    #[test]
    fn test_deadlock_only_for_dining() {
        for problem in Problem::all() {
            assert_eq!(
                problem.supports(Discipline::Deadlock),
                problem == Problem::DiningPhilosophers
            );
            assert!(problem.supports(Discipline::Monitor));
        }
    }

    #[test]
    fn test_discipline_aliases() {
        assert_eq!("hoare".parse::<Discipline>(), Ok(Discipline::Monitor));
        assert_eq!("SPIN".parse::<Discipline>(), Ok(Discipline::Mutex));
        assert!(Discipline::Monitor.guarantees_progress());
        assert!(!Discipline::Barrier.guarantees_progress());
    }
}
