use crate::{DesiredState, Error, Result};

/// Remote-side operations for one resource kind.
///
/// `fetch` reports the target's absence as `Ok(None)`; only referenced
/// lookups and transport-level problems are errors. `create` must surface a
/// same-name race as [`Error::AlreadyExists`] rather than succeeding.
#[allow(async_fn_in_trait)]
pub trait Gateway {
    type Descriptor;
    type Resource;

    fn kind(&self) -> &'static str;

    async fn fetch(&self, name: &str) -> Result<Option<Self::Resource>>;

    async fn create(&self, name: &str, descriptor: &Self::Descriptor) -> Result<Self::Resource>;

    async fn delete(&self, name: &str) -> Result<()>;
}

/// Result of one convergence attempt. `changed` is true iff a mutating call
/// actually executed and succeeded.
#[derive(Debug)]
pub struct Outcome<R> {
    pub changed: bool,
    pub resource: Option<R>,
}

/// Per-name outcomes for a batch, in input order.
#[derive(Debug)]
pub struct BatchOutcome<R> {
    pub changed: bool,
    pub names: Vec<String>,
    pub outcomes: Vec<Outcome<R>>,
}

/// Drive one named resource toward the desired state.
///
/// Exactly one of {create, delete, no-op} happens per call. Present+exists
/// never re-creates or mutates: presence alone satisfies the desired state,
/// and callers wanting attribute changes must delete and re-create.
pub async fn reconcile<G: Gateway>(
    gateway: &G,
    desired: DesiredState,
    name: &str,
    descriptor: &G::Descriptor,
) -> Result<Outcome<G::Resource>> {
    let existing = gateway.fetch(name).await?;

    match desired {
        DesiredState::Present => match existing {
            Some(resource) => Ok(Outcome {
                changed: false,
                resource: Some(resource),
            }),
            None => match gateway.create(name, descriptor).await {
                Ok(resource) => {
                    tracing::info!(kind = gateway.kind(), name, "created");
                    Ok(Outcome {
                        changed: true,
                        resource: Some(resource),
                    })
                }
                Err(Error::AlreadyExists { .. }) => {
                    // Lost a create race; the winner's copy satisfies the
                    // desired state and our mutation never happened.
                    tracing::debug!(kind = gateway.kind(), name, "create raced, re-fetching");
                    let resource = gateway.fetch(name).await?.ok_or(Error::NotFound {
                        kind: gateway.kind(),
                        name: name.to_string(),
                    })?;
                    Ok(Outcome {
                        changed: false,
                        resource: Some(resource),
                    })
                }
                Err(e) => Err(e),
            },
        },
        DesiredState::Absent => match existing {
            Some(_) => {
                gateway.delete(name).await?;
                tracing::info!(kind = gateway.kind(), name, "deleted");
                Ok(Outcome {
                    changed: true,
                    resource: None,
                })
            }
            None => Ok(Outcome {
                changed: false,
                resource: None,
            }),
        },
    }
}

/// Apply [`reconcile`] across a list of names, in input order.
///
/// The first failure aborts the whole batch; mutations already committed
/// remotely stay committed.
pub async fn reconcile_all<G: Gateway>(
    gateway: &G,
    desired: DesiredState,
    names: &[String],
    descriptor: &G::Descriptor,
) -> Result<BatchOutcome<G::Resource>> {
    let mut changed = false;
    let mut outcomes = Vec::with_capacity(names.len());

    for name in names {
        let outcome = reconcile(gateway, desired, name, descriptor).await?;
        changed |= outcome.changed;
        outcomes.push(outcome);
    }

    Ok(BatchOutcome {
        changed,
        names: names.to_vec(),
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// In-memory gateway recording every call it receives.
    #[derive(Default)]
    struct FakeGateway {
        existing: Mutex<Vec<String>>,
        creates: Mutex<Vec<String>>,
        deletes: Mutex<Vec<String>>,
        /// Names whose create is rejected as a lost race.
        conflict_on: Vec<String>,
        /// Names whose create fails at the transport level.
        fail_on: Vec<String>,
    }

    impl FakeGateway {
        fn with_existing(names: &[&str]) -> Self {
            FakeGateway {
                existing: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
                ..Default::default()
            }
        }
    }

    impl Gateway for FakeGateway {
        type Descriptor = ();
        type Resource = String;

        fn kind(&self) -> &'static str {
            "widget"
        }

        async fn fetch(&self, name: &str) -> Result<Option<String>> {
            let existing = self.existing.lock().unwrap();
            Ok(existing.iter().find(|n| *n == name).cloned())
        }

        async fn create(&self, name: &str, _descriptor: &()) -> Result<String> {
            if self.conflict_on.iter().any(|n| n == name) {
                // Another actor won the race; make the fetch see their copy.
                self.existing.lock().unwrap().push(name.to_string());
                return Err(Error::AlreadyExists {
                    kind: "widget",
                    name: name.to_string(),
                });
            }
            if self.fail_on.iter().any(|n| n == name) {
                return Err(Error::Transport("connection reset".into()));
            }
            self.creates.lock().unwrap().push(name.to_string());
            self.existing.lock().unwrap().push(name.to_string());
            Ok(name.to_string())
        }

        async fn delete(&self, name: &str) -> Result<()> {
            self.deletes.lock().unwrap().push(name.to_string());
            self.existing.lock().unwrap().retain(|n| n != name);
            Ok(())
        }
    }

    #[tokio::test]
    async fn present_and_existing_is_a_noop() {
        let gw = FakeGateway::with_existing(&["foo"]);
        let outcome = reconcile(&gw, DesiredState::Present, "foo", &()).await.unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.resource.as_deref(), Some("foo"));
        assert!(gw.creates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn present_and_missing_creates_exactly_once() {
        let gw = FakeGateway::default();
        let outcome = reconcile(&gw, DesiredState::Present, "foo", &()).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(*gw.creates.lock().unwrap(), vec!["foo"]);
    }

    #[tokio::test]
    async fn absent_and_existing_deletes_exactly_once() {
        let gw = FakeGateway::with_existing(&["foo"]);
        let outcome = reconcile(&gw, DesiredState::Absent, "foo", &()).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(*gw.deletes.lock().unwrap(), vec!["foo"]);
    }

    #[tokio::test]
    async fn absent_and_missing_is_a_noop() {
        let gw = FakeGateway::default();
        let outcome = reconcile(&gw, DesiredState::Absent, "foo", &()).await.unwrap();
        assert!(!outcome.changed);
        assert!(gw.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_race_recovers_without_reporting_a_change() {
        let gw = FakeGateway {
            conflict_on: vec!["foo".to_string()],
            ..Default::default()
        };
        let outcome = reconcile(&gw, DesiredState::Present, "foo", &()).await.unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.resource.as_deref(), Some("foo"));
        assert!(gw.creates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let gw = FakeGateway::with_existing(&["b"]);
        let names: Vec<String> = ["a", "b", "c"].iter().map(|n| n.to_string()).collect();
        let batch = reconcile_all(&gw, DesiredState::Present, &names, &()).await.unwrap();
        assert_eq!(batch.names, names);
        assert!(batch.changed);
        assert_eq!(batch.outcomes.len(), 3);
        assert!(batch.outcomes[0].changed);
        assert!(!batch.outcomes[1].changed);
        assert!(batch.outcomes[2].changed);
    }

    #[tokio::test]
    async fn batch_is_all_changed_false_when_nothing_to_do() {
        let gw = FakeGateway::default();
        let names: Vec<String> = ["a", "b"].iter().map(|n| n.to_string()).collect();
        let batch = reconcile_all(&gw, DesiredState::Absent, &names, &()).await.unwrap();
        assert!(!batch.changed);
        assert!(gw.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_aborts_on_first_failure_keeping_committed_work() {
        let gw = FakeGateway {
            fail_on: vec!["bar".to_string()],
            ..Default::default()
        };
        let names: Vec<String> = ["foo", "bar", "baz"].iter().map(|n| n.to_string()).collect();
        let err = reconcile_all(&gw, DesiredState::Present, &names, &()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        // "foo" was created before the batch died and is not rolled back.
        assert_eq!(*gw.creates.lock().unwrap(), vec!["foo"]);
    }
}
