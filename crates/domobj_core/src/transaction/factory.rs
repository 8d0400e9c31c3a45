//! Component factories and two-phase transaction construction.

use super::{ClientTransaction, TransactionInner};
use crate::application_data::ApplicationData;
use crate::commit::CommitRollbackAgent;
use crate::config::Config;
use crate::data_manager::DataManager;
use crate::enlisted::EnlistedDomainObjectManager;
use crate::error::CoreResult;
use crate::events::{EventBroker, LoggingListener};
use crate::extension::{ClientTransactionExtensionCollection, CommitValidationExtension};
use crate::hierarchy::TransactionHierarchyManager;
use crate::invalid::InvalidDomainObjectManager;
use crate::lifetime::ObjectLifetimeAgent;
use crate::mapping::MappingConfiguration;
use crate::persistence::{PersistenceStrategy, RootPersistenceStrategy, SubPersistenceStrategy};
use crate::query::QueryManager;
use crate::types::TransactionId;
use domobj_storage::StorageProvider;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Builds the components of one transaction.
///
/// [`ClientTransaction::from_factory`] calls the `create_*` methods in a
/// fixed order; each method receives only components that already exist.
/// The defaults build the standard components.
pub trait ClientTransactionComponentFactory {
    /// The mapping of the new transaction.
    fn mapping(&self) -> Arc<MappingConfiguration>;

    /// The configuration of the new transaction.
    fn config(&self) -> Config;

    /// Creates or shares the application data.
    fn create_application_data(&self) -> ApplicationData;

    /// Creates the event broker.
    fn create_event_broker(&self) -> Arc<EventBroker> {
        let broker = EventBroker::new();
        if self.config().trace_events {
            broker.add_listener(Arc::new(LoggingListener));
        }
        Arc::new(broker)
    }

    /// Creates the hierarchy manager.
    fn create_transaction_hierarchy_manager(&self, id: TransactionId)
        -> TransactionHierarchyManager;

    /// Creates or shares the identity map.
    fn create_enlisted_object_manager(&self) -> Arc<EnlistedDomainObjectManager>;

    /// Creates the invalid object manager.
    fn create_invalid_domain_object_manager(
        &self,
        broker: &Arc<EventBroker>,
    ) -> Arc<InvalidDomainObjectManager>;

    /// Creates the persistence strategy.
    fn create_persistence_strategy(&self) -> Arc<dyn PersistenceStrategy>;

    /// Creates the data manager.
    fn create_data_manager(
        &self,
        broker: &Arc<EventBroker>,
        invalid: &Arc<InvalidDomainObjectManager>,
        enlisted: &Arc<EnlistedDomainObjectManager>,
        persistence: &Arc<dyn PersistenceStrategy>,
        hierarchy_manager: &TransactionHierarchyManager,
    ) -> Arc<DataManager> {
        Arc::new(DataManager::new(
            self.mapping(),
            self.config(),
            Arc::clone(broker),
            Arc::clone(invalid),
            Arc::clone(enlisted),
            Arc::clone(persistence),
            hierarchy_manager,
        ))
    }

    /// Creates the object lifetime agent.
    fn create_object_lifetime_agent(
        &self,
        broker: &Arc<EventBroker>,
        enlisted: &Arc<EnlistedDomainObjectManager>,
        invalid: &Arc<InvalidDomainObjectManager>,
        persistence: &Arc<dyn PersistenceStrategy>,
        data_manager: &Arc<DataManager>,
        hierarchy_manager: &TransactionHierarchyManager,
    ) -> ObjectLifetimeAgent {
        ObjectLifetimeAgent::new(
            self.mapping(),
            Arc::clone(broker),
            Arc::clone(enlisted),
            Arc::clone(invalid),
            Arc::clone(persistence),
            Arc::clone(data_manager),
            hierarchy_manager,
        )
    }

    /// Creates the query manager.
    fn create_query_manager(
        &self,
        broker: &Arc<EventBroker>,
        invalid: &Arc<InvalidDomainObjectManager>,
        persistence: &Arc<dyn PersistenceStrategy>,
        data_manager: &Arc<DataManager>,
    ) -> QueryManager {
        QueryManager::new(
            self.mapping(),
            Arc::clone(persistence),
            Arc::clone(data_manager),
            Arc::clone(invalid),
            Arc::clone(broker),
        )
    }

    /// Creates the commit and rollback agent.
    fn create_commit_rollback_agent(
        &self,
        broker: &Arc<EventBroker>,
        invalid: &Arc<InvalidDomainObjectManager>,
        persistence: &Arc<dyn PersistenceStrategy>,
        data_manager: &Arc<DataManager>,
    ) -> CommitRollbackAgent {
        CommitRollbackAgent::new(
            Arc::clone(broker),
            Arc::clone(persistence),
            Arc::clone(data_manager),
            Arc::clone(invalid),
        )
    }

    /// Creates the extension collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial extensions have duplicate keys.
    fn create_extensions(&self) -> CoreResult<Arc<ClientTransactionExtensionCollection>>;
}

/// Builds root transactions over a storage provider.
pub struct RootComponentFactory {
    mapping: Arc<MappingConfiguration>,
    storage: Arc<dyn StorageProvider>,
    config: Config,
    application_data: ApplicationData,
}

impl RootComponentFactory {
    /// Creates a root factory.
    #[must_use]
    pub fn new(
        mapping: Arc<MappingConfiguration>,
        storage: Arc<dyn StorageProvider>,
        config: Config,
    ) -> Self {
        Self {
            mapping,
            storage,
            config,
            application_data: ApplicationData::new(),
        }
    }

    /// Uses `application_data` instead of an empty bag.
    #[must_use]
    pub fn with_application_data(mut self, application_data: ApplicationData) -> Self {
        self.application_data = application_data;
        self
    }
}

impl ClientTransactionComponentFactory for RootComponentFactory {
    fn mapping(&self) -> Arc<MappingConfiguration> {
        Arc::clone(&self.mapping)
    }

    fn config(&self) -> Config {
        self.config.clone()
    }

    fn create_application_data(&self) -> ApplicationData {
        self.application_data.clone()
    }

    fn create_transaction_hierarchy_manager(
        &self,
        id: TransactionId,
    ) -> TransactionHierarchyManager {
        TransactionHierarchyManager::new_root(id)
    }

    fn create_enlisted_object_manager(&self) -> Arc<EnlistedDomainObjectManager> {
        Arc::new(EnlistedDomainObjectManager::new())
    }

    fn create_invalid_domain_object_manager(
        &self,
        broker: &Arc<EventBroker>,
    ) -> Arc<InvalidDomainObjectManager> {
        Arc::new(InvalidDomainObjectManager::new(Arc::clone(broker)))
    }

    fn create_persistence_strategy(&self) -> Arc<dyn PersistenceStrategy> {
        Arc::new(RootPersistenceStrategy::new(
            Arc::clone(&self.mapping),
            Arc::clone(&self.storage),
        ))
    }

    fn create_extensions(&self) -> CoreResult<Arc<ClientTransactionExtensionCollection>> {
        let extensions = ClientTransactionExtensionCollection::new();
        if self.config.commit_validation {
            extensions.add(Arc::new(CommitValidationExtension))?;
        }
        Ok(Arc::new(extensions))
    }
}

/// Builds sub-transactions of a parent transaction.
///
/// The sub-transaction shares the parent's identity map and application
/// data. It starts with the parent's invalid and deleted objects marked
/// invalid, and with no extensions.
pub struct SubComponentFactory {
    parent: ClientTransaction,
}

impl SubComponentFactory {
    /// Creates a factory for sub-transactions of `parent`.
    #[must_use]
    pub fn new(parent: ClientTransaction) -> Self {
        Self { parent }
    }
}

impl ClientTransactionComponentFactory for SubComponentFactory {
    fn mapping(&self) -> Arc<MappingConfiguration> {
        Arc::clone(self.parent.mapping())
    }

    fn config(&self) -> Config {
        self.parent.config().clone()
    }

    fn create_application_data(&self) -> ApplicationData {
        self.parent.application_data().clone()
    }

    fn create_transaction_hierarchy_manager(
        &self,
        id: TransactionId,
    ) -> TransactionHierarchyManager {
        TransactionHierarchyManager::new_sub(id, self.parent.clone())
    }

    fn create_enlisted_object_manager(&self) -> Arc<EnlistedDomainObjectManager> {
        Arc::clone(self.parent.enlisted_objects())
    }

    fn create_invalid_domain_object_manager(
        &self,
        broker: &Arc<EventBroker>,
    ) -> Arc<InvalidDomainObjectManager> {
        let mut objects = self.parent.invalid_objects().invalid_objects();
        objects.extend(self.parent.data_manager().deleted_objects());
        Arc::new(InvalidDomainObjectManager::with_objects(
            Arc::clone(broker),
            objects,
        ))
    }

    fn create_persistence_strategy(&self) -> Arc<dyn PersistenceStrategy> {
        Arc::new(SubPersistenceStrategy::new(self.parent.clone()))
    }

    fn create_extensions(&self) -> CoreResult<Arc<ClientTransactionExtensionCollection>> {
        Ok(Arc::new(ClientTransactionExtensionCollection::new()))
    }
}

impl ClientTransaction {
    /// Builds a transaction from the components of `factory`.
    ///
    /// Components are created in dependency order. The transaction is
    /// linked into its hierarchy before `transaction_initialize` is raised,
    /// and its extensions are installed before any event is raised.
    ///
    /// # Errors
    ///
    /// Returns errors from `create_extensions`, from the parent's
    /// `sub_transaction_initialize` handlers and from
    /// `transaction_initialize` handlers.
    pub fn from_factory(factory: &dyn ClientTransactionComponentFactory) -> CoreResult<Self> {
        let id = TransactionId::next();
        let application_data = factory.create_application_data();
        let event_broker = factory.create_event_broker();
        let hierarchy_manager = factory.create_transaction_hierarchy_manager(id);
        hierarchy_manager.install_listeners(&event_broker);
        let enlisted = factory.create_enlisted_object_manager();
        let invalid = factory.create_invalid_domain_object_manager(&event_broker);
        let persistence = factory.create_persistence_strategy();
        let data_manager = factory.create_data_manager(
            &event_broker,
            &invalid,
            &enlisted,
            &persistence,
            &hierarchy_manager,
        );
        let lifetime = factory.create_object_lifetime_agent(
            &event_broker,
            &enlisted,
            &invalid,
            &persistence,
            &data_manager,
            &hierarchy_manager,
        );
        let query_manager =
            factory.create_query_manager(&event_broker, &invalid, &persistence, &data_manager);
        let commit_agent =
            factory.create_commit_rollback_agent(&event_broker, &invalid, &persistence, &data_manager);
        let extensions = factory.create_extensions()?;
        event_broker.install_extensions(Arc::clone(&extensions));

        let tx = Self {
            inner: Arc::new(TransactionInner {
                id,
                mapping: factory.mapping(),
                config: factory.config(),
                application_data,
                event_broker,
                hierarchy_manager,
                enlisted,
                invalid,
                persistence,
                data_manager,
                lifetime,
                query_manager,
                commit_agent,
                extensions,
                discarded: AtomicBool::new(false),
            }),
        };
        tx.inner.hierarchy_manager.on_transaction_created(&tx);
        tx.inner.hierarchy_manager.on_before_transaction_initialize(&tx)?;
        tx.inner.event_broker.raise_transaction_initialize(&tx)?;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ClientTransactionExtension;
    use crate::mapping::test_support::order_mapping;
    use domobj_storage::InMemoryStorage;
    use parking_lot::Mutex;

    /// Records the order in which components are requested.
    struct RecordingFactory {
        inner: RootComponentFactory,
        calls: Mutex<Vec<&'static str>>,
    }

    impl RecordingFactory {
        fn record(&self, call: &'static str) {
            self.calls.lock().push(call);
        }
    }

    impl ClientTransactionComponentFactory for RecordingFactory {
        fn mapping(&self) -> Arc<MappingConfiguration> {
            self.inner.mapping()
        }

        fn config(&self) -> Config {
            self.inner.config()
        }

        fn create_application_data(&self) -> ApplicationData {
            self.record("application_data");
            self.inner.create_application_data()
        }

        fn create_event_broker(&self) -> Arc<EventBroker> {
            self.record("event_broker");
            self.inner.create_event_broker()
        }

        fn create_transaction_hierarchy_manager(
            &self,
            id: TransactionId,
        ) -> TransactionHierarchyManager {
            self.record("hierarchy_manager");
            self.inner.create_transaction_hierarchy_manager(id)
        }

        fn create_enlisted_object_manager(&self) -> Arc<EnlistedDomainObjectManager> {
            self.record("enlisted");
            self.inner.create_enlisted_object_manager()
        }

        fn create_invalid_domain_object_manager(
            &self,
            broker: &Arc<EventBroker>,
        ) -> Arc<InvalidDomainObjectManager> {
            assert!(broker.listener_count() > 0, "hierarchy listeners must be installed first");
            self.record("invalid");
            self.inner.create_invalid_domain_object_manager(broker)
        }

        fn create_persistence_strategy(&self) -> Arc<dyn PersistenceStrategy> {
            self.record("persistence");
            self.inner.create_persistence_strategy()
        }

        fn create_data_manager(
            &self,
            broker: &Arc<EventBroker>,
            invalid: &Arc<InvalidDomainObjectManager>,
            enlisted: &Arc<EnlistedDomainObjectManager>,
            persistence: &Arc<dyn PersistenceStrategy>,
            hierarchy_manager: &TransactionHierarchyManager,
        ) -> Arc<DataManager> {
            self.record("data_manager");
            self.inner
                .create_data_manager(broker, invalid, enlisted, persistence, hierarchy_manager)
        }

        fn create_object_lifetime_agent(
            &self,
            broker: &Arc<EventBroker>,
            enlisted: &Arc<EnlistedDomainObjectManager>,
            invalid: &Arc<InvalidDomainObjectManager>,
            persistence: &Arc<dyn PersistenceStrategy>,
            data_manager: &Arc<DataManager>,
            hierarchy_manager: &TransactionHierarchyManager,
        ) -> ObjectLifetimeAgent {
            self.record("lifetime");
            self.inner.create_object_lifetime_agent(
                broker,
                enlisted,
                invalid,
                persistence,
                data_manager,
                hierarchy_manager,
            )
        }

        fn create_query_manager(
            &self,
            broker: &Arc<EventBroker>,
            invalid: &Arc<InvalidDomainObjectManager>,
            persistence: &Arc<dyn PersistenceStrategy>,
            data_manager: &Arc<DataManager>,
        ) -> QueryManager {
            self.record("query_manager");
            self.inner
                .create_query_manager(broker, invalid, persistence, data_manager)
        }

        fn create_commit_rollback_agent(
            &self,
            broker: &Arc<EventBroker>,
            invalid: &Arc<InvalidDomainObjectManager>,
            persistence: &Arc<dyn PersistenceStrategy>,
            data_manager: &Arc<DataManager>,
        ) -> CommitRollbackAgent {
            self.record("commit_agent");
            self.inner
                .create_commit_rollback_agent(broker, invalid, persistence, data_manager)
        }

        fn create_extensions(&self) -> CoreResult<Arc<ClientTransactionExtensionCollection>> {
            self.record("extensions");
            self.inner.create_extensions()
        }
    }

    /// Records whether it was installed when `transaction_initialize` ran.
    struct InitializeProbe {
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ClientTransactionExtension for InitializeProbe {
        fn key(&self) -> &str {
            "probe"
        }

        fn transaction_initialize(&self, _tx: &ClientTransaction) -> CoreResult<()> {
            self.seen.lock().push("transaction_initialize");
            Ok(())
        }
    }

    fn root_factory(config: Config) -> RootComponentFactory {
        RootComponentFactory::new(order_mapping(), Arc::new(InMemoryStorage::new()), config)
    }

    #[test]
    fn components_are_created_in_dependency_order() {
        let factory = RecordingFactory {
            inner: root_factory(Config::default()),
            calls: Mutex::new(Vec::new()),
        };
        let tx = ClientTransaction::from_factory(&factory).unwrap();

        assert_eq!(
            *factory.calls.lock(),
            vec![
                "application_data",
                "event_broker",
                "hierarchy_manager",
                "enlisted",
                "invalid",
                "persistence",
                "data_manager",
                "lifetime",
                "query_manager",
                "commit_agent",
                "extensions",
            ]
        );
        assert!(tx.is_active());
        assert_eq!(tx.root_transaction(), tx);
        assert!(tx.parent_transaction().is_none());
    }

    #[test]
    fn extensions_see_transaction_initialize() {
        struct WithProbe {
            inner: RootComponentFactory,
            seen: Arc<Mutex<Vec<&'static str>>>,
        }

        impl ClientTransactionComponentFactory for WithProbe {
            fn mapping(&self) -> Arc<MappingConfiguration> {
                self.inner.mapping()
            }
            fn config(&self) -> Config {
                self.inner.config()
            }
            fn create_application_data(&self) -> ApplicationData {
                self.inner.create_application_data()
            }
            fn create_transaction_hierarchy_manager(
                &self,
                id: TransactionId,
            ) -> TransactionHierarchyManager {
                self.inner.create_transaction_hierarchy_manager(id)
            }
            fn create_enlisted_object_manager(&self) -> Arc<EnlistedDomainObjectManager> {
                self.inner.create_enlisted_object_manager()
            }
            fn create_invalid_domain_object_manager(
                &self,
                broker: &Arc<EventBroker>,
            ) -> Arc<InvalidDomainObjectManager> {
                self.inner.create_invalid_domain_object_manager(broker)
            }
            fn create_persistence_strategy(&self) -> Arc<dyn PersistenceStrategy> {
                self.inner.create_persistence_strategy()
            }
            fn create_extensions(&self) -> CoreResult<Arc<ClientTransactionExtensionCollection>> {
                let extensions = self.inner.create_extensions()?;
                extensions.add(Arc::new(InitializeProbe {
                    seen: Arc::clone(&self.seen),
                }))?;
                Ok(extensions)
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let factory = WithProbe {
            inner: root_factory(Config::default()),
            seen: Arc::clone(&seen),
        };
        let tx = ClientTransaction::from_factory(&factory).unwrap();
        assert_eq!(*seen.lock(), vec!["transaction_initialize"]);
        assert_eq!(
            tx.extensions().keys(),
            vec![CommitValidationExtension::KEY.to_string(), "probe".to_string()]
        );
    }

    #[test]
    fn commit_validation_follows_config() {
        let tx = ClientTransaction::from_factory(&root_factory(
            Config::default().commit_validation(false).trace_events(true),
        ))
        .unwrap();
        assert!(tx.extensions().is_empty());
        assert_eq!(tx.event_broker().listener_count(), 2);
    }
}
