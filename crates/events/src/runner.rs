//! Projection runner utilities (read model builders).
//!
//! Read models are **disposable**; events are the source of truth.
//! This module provides deterministic replay and cursor/version tracking
//! without making storage assumptions.

use dropmart_core::SupplierId;

use crate::{EventEnvelope, Projection};

/// Tracks projection progress for a single supplier.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    supplier_id: SupplierId,
    last_sequence_number: u64,
}

impl ProjectionCursor {
    pub fn supplier_id(&self) -> SupplierId {
        self.supplier_id
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    SupplierMismatch { expected: SupplierId, found: SupplierId },
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Runs envelopes through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: Option<ProjectionCursor>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: None,
        }
    }

    /// Create a runner pinned to a specific supplier.
    ///
    /// This prevents accidentally starting a projection with an event from
    /// the wrong supplier.
    pub fn new_for_supplier(supplier_id: SupplierId, projection: P) -> Self {
        Self {
            projection,
            cursor: Some(ProjectionCursor {
                supplier_id,
                last_sequence_number: 0,
            }),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Current cursor/version for this projection (if any envelopes were applied).
    pub fn cursor(&self) -> Option<ProjectionCursor> {
        self.cursor
    }

    /// Apply a single envelope, enforcing supplier consistency and monotonic sequencing.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<(), ProjectionError> {
        let found_supplier = envelope.supplier_id();
        let found_seq = envelope.sequence_number();

        match self.cursor {
            None => {
                self.projection.apply(envelope);
                self.cursor = Some(ProjectionCursor {
                    supplier_id: found_supplier,
                    last_sequence_number: found_seq,
                });
                Ok(())
            }
            Some(mut c) => {
                if c.supplier_id != found_supplier {
                    return Err(ProjectionError::SupplierMismatch {
                        expected: c.supplier_id,
                        found: found_supplier,
                    });
                }
                if found_seq <= c.last_sequence_number {
                    return Err(ProjectionError::NonMonotonicSequence {
                        last: c.last_sequence_number,
                        found: found_seq,
                    });
                }

                self.projection.apply(envelope);
                c.last_sequence_number = found_seq;
                self.cursor = Some(c);
                Ok(())
            }
        }
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying the full event history.
    ///
    /// The factory is used to create a fresh projection instance.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(P, Option<ProjectionCursor>), ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok((runner.projection, runner.cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Event, SupplierScoped};
    use chrono::{DateTime, Utc};
    use dropmart_core::AggregateId;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Ticked {
        occurred_at: DateTime<Utc>,
    }

    impl Event for Ticked {
        fn event_type(&self) -> &'static str {
            "test.ticked"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.occurred_at
        }
    }

    #[derive(Debug, Default)]
    struct TickCount {
        count: u64,
    }

    impl Projection for TickCount {
        type Ev = Ticked;

        fn apply(&mut self, _envelope: &EventEnvelope<Ticked>) {
            self.count += 1;
        }
    }

    fn envelope(supplier_id: SupplierId, seq: u64) -> EventEnvelope<Ticked> {
        EventEnvelope::new(
            Uuid::now_v7(),
            supplier_id,
            AggregateId::new(),
            "test.tick",
            seq,
            Ticked {
                occurred_at: Utc::now(),
            },
        )
    }

    #[test]
    fn runner_tracks_cursor_across_applies() {
        let supplier_id = SupplierId::new();
        let mut runner = ProjectionRunner::new(TickCount::default());

        runner.apply(&envelope(supplier_id, 1)).unwrap();
        runner.apply(&envelope(supplier_id, 2)).unwrap();

        assert_eq!(runner.projection().count, 2);
        let cursor = runner.cursor().unwrap();
        assert_eq!(cursor.supplier_id(), supplier_id);
        assert_eq!(cursor.last_sequence_number(), 2);
    }

    #[test]
    fn non_monotonic_sequence_is_rejected() {
        let supplier_id = SupplierId::new();
        let mut runner = ProjectionRunner::new(TickCount::default());

        runner.apply(&envelope(supplier_id, 2)).unwrap();
        let err = runner.apply(&envelope(supplier_id, 2)).unwrap_err();
        assert_eq!(
            err,
            ProjectionError::NonMonotonicSequence { last: 2, found: 2 }
        );
    }

    #[test]
    fn supplier_pinned_runner_rejects_foreign_envelopes() {
        let pinned = SupplierId::new();
        let foreign = SupplierId::new();
        let mut runner = ProjectionRunner::new_for_supplier(pinned, TickCount::default());

        let env = envelope(foreign, 1);
        assert_eq!(SupplierScoped::supplier_id(&env), foreign);
        let err = runner.apply(&env).unwrap_err();
        assert_eq!(
            err,
            ProjectionError::SupplierMismatch {
                expected: pinned,
                found: foreign
            }
        );
    }

    #[test]
    fn rebuild_from_scratch_replays_full_history() {
        let supplier_id = SupplierId::new();
        let history: Vec<_> = (1..=5).map(|seq| envelope(supplier_id, seq)).collect();

        let (projection, cursor) =
            ProjectionRunner::rebuild_from_scratch(TickCount::default, history.iter()).unwrap();
        assert_eq!(projection.count, 5);
        assert_eq!(cursor.unwrap().last_sequence_number(), 5);
    }
}
