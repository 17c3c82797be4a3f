use crate::{Command, Event};

/// Handles a command and emits events (command handler abstraction).
///
/// A simpler, standalone interface for command → events transformation,
/// independent of the full aggregate lifecycle. Useful for workers and for
/// integration tests that don't need the dispatcher pipeline.
pub trait CommandHandler {
    type Cmd: Command;
    type Ev: Event;
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn handle(&self, command: Self::Cmd) -> Result<Vec<Self::Ev>, Self::Error>;
}

/// Execute an aggregate command deterministically (no IO, no async).
///
/// The canonical event-sourced lifecycle in one step:
///
/// 1. **Decide**: `aggregate.handle(command)` produces events (pure).
/// 2. **Evolve**: each event is applied via `aggregate.apply(event)`.
///
/// The aggregate maintains its own version tracking during `apply()`.
/// For the full pipeline (persistence, publication, optimistic concurrency),
/// use the infrastructure `CommandDispatcher` instead.
pub fn execute<A>(
    aggregate: &mut A,
    command: &A::Command,
) -> Result<Vec<A::Event>, A::Error>
where
    A: dropmart_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use dropmart_core::{Aggregate, AggregateId, AggregateRoot, DomainError};

    #[derive(Debug, Clone)]
    struct Bump {
        counter_id: AggregateId,
        by: u64,
        occurred_at: DateTime<Utc>,
    }

    impl Command for Bump {
        fn target_aggregate_id(&self) -> AggregateId {
            self.counter_id
        }
    }

    #[derive(Debug, Clone)]
    struct Bumped {
        by: u64,
        occurred_at: DateTime<Utc>,
    }

    impl Event for Bumped {
        fn event_type(&self) -> &'static str {
            "test.counter.bumped"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.occurred_at
        }
    }

    #[derive(Debug)]
    struct Counter {
        id: AggregateId,
        value: u64,
        version: u64,
    }

    impl AggregateRoot for Counter {
        type Id = AggregateId;

        fn id(&self) -> &AggregateId {
            &self.id
        }

        fn version(&self) -> u64 {
            self.version
        }
    }

    impl Aggregate for Counter {
        type Command = Bump;
        type Event = Bumped;
        type Error = DomainError;

        fn apply(&mut self, event: &Bumped) {
            self.value += event.by;
            self.version += 1;
        }

        fn handle(&self, command: &Bump) -> Result<Vec<Bumped>, DomainError> {
            if command.by == 0 {
                return Err(DomainError::validation("bump must be positive"));
            }
            Ok(vec![Bumped {
                by: command.by,
                occurred_at: command.occurred_at,
            }])
        }
    }

    struct CounterHandler {
        counter: std::sync::Mutex<Counter>,
    }

    impl CommandHandler for CounterHandler {
        type Cmd = Bump;
        type Ev = Bumped;
        type Error = DomainError;

        fn handle(&self, command: Bump) -> Result<Vec<Bumped>, DomainError> {
            let mut counter = self.counter.lock().unwrap();
            execute(&mut *counter, &command)
        }
    }

    #[test]
    fn execute_decides_then_evolves() {
        let id = AggregateId::new();
        let mut counter = Counter {
            id,
            value: 0,
            version: 0,
        };

        let events = execute(
            &mut counter,
            &Bump {
                counter_id: id,
                by: 3,
                occurred_at: Utc::now(),
            },
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(counter.value, 3);
        assert_eq!(counter.version(), 1);
    }

    #[test]
    fn command_handler_routes_by_target() {
        let id = AggregateId::new();
        let handler = CounterHandler {
            counter: std::sync::Mutex::new(Counter {
                id,
                value: 0,
                version: 0,
            }),
        };

        let cmd = Bump {
            counter_id: id,
            by: 2,
            occurred_at: Utc::now(),
        };
        assert_eq!(cmd.target_aggregate_id(), id);

        handler.handle(cmd.clone()).unwrap();
        handler.handle(cmd).unwrap();
        assert_eq!(handler.counter.lock().unwrap().value, 4);
    }

    #[test]
    fn rejected_command_leaves_state_untouched() {
        let id = AggregateId::new();
        let mut counter = Counter {
            id,
            value: 7,
            version: 1,
        };

        let err = execute(
            &mut counter,
            &Bump {
                counter_id: id,
                by: 0,
                occurred_at: Utc::now(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(counter.value, 7);
        assert_eq!(counter.version(), 1);
    }
}
