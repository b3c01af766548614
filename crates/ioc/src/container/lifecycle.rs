use std::sync::Arc;

use crate::errors::BoxError;

/// Trait for services that need proper disposal/cleanup
pub trait Disposable: Send + Sync {
    /// Dispose of the service and clean up resources
    fn dispose(&self) -> Result<(), BoxError>;
}

struct DisposalEntry {
    component: String,
    service: Arc<dyn Disposable>,
}

/// Instances owned by a scope, disposed in reverse order of activation
#[derive(Default)]
pub struct DisposalList {
    entries: Vec<DisposalEntry>,
}

impl std::fmt::Debug for DisposalList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalList")
            .field("disposable_services_count", &self.entries.len())
            .finish()
    }
}

impl DisposalList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an activated instance
    pub fn add(&mut self, component: impl Into<String>, service: Arc<dyn Disposable>) {
        self.entries.push(DisposalEntry {
            component: component.into(),
            service,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take the tracked instances, leaving the list empty
    pub(crate) fn take(&mut self) -> DisposalList {
        DisposalList {
            entries: std::mem::take(&mut self.entries),
        }
    }

    /// Dispose everything in LIFO order.
    ///
    /// Every instance is attempted; failures are returned once all have run.
    pub fn dispose_all(self) -> Vec<BoxError> {
        let mut errors = Vec::new();

        for entry in self.entries.into_iter().rev() {
            tracing::trace!("Disposing instance of '{}'", entry.component);
            if let Err(e) = entry.service.dispose() {
                tracing::warn!("Error disposing instance of '{}': {}", entry.component, e);
                errors.push(e);
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl Disposable for Recorder {
        fn dispose(&self) -> Result<(), BoxError> {
            self.log.lock().push(self.name);
            if self.fail {
                return Err(format!("{} refused to close", self.name).into());
            }
            Ok(())
        }
    }

    #[test]
    fn test_disposal_runs_in_reverse_order_and_collects_errors() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = DisposalList::new();

        for (name, fail) in [("first", false), ("second", true), ("third", false)] {
            list.add(
                name,
                Arc::new(Recorder {
                    name,
                    log: log.clone(),
                    fail,
                }),
            );
        }
        assert_eq!(list.len(), 3);

        let errors = list.dispose_all();

        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "second refused to close");
    }

    #[test]
    fn test_take_empties_the_list() {
        let mut list = DisposalList::new();
        list.add(
            "only",
            Arc::new(Recorder {
                name: "only",
                log: Arc::new(Mutex::new(Vec::new())),
                fail: false,
            }),
        );

        let taken = list.take();
        assert!(list.is_empty());
        assert_eq!(taken.len(), 1);
    }
}
