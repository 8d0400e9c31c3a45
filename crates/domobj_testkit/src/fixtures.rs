//! Test fixtures: a sales domain and seeded storage.
//!
//! The domain has an abstract `Company` with `Customer` and `Supplier`
//! subclasses, customers own orders, orders own items and an optional
//! ticket, and officials are assigned to orders through a read-only
//! collection.

use domobj_codec::{ObjectId, StorageKey, ValueType};
use domobj_core::{
    ClassBuilder, ClientTransaction, Config, MappingBuilder, MappingConfiguration,
    PropertyDefinition, Relation,
};
use domobj_storage::{FileStorage, InMemoryStorage, StorageProvider, StoredRecord};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Builds the sales mapping.
///
/// | Class       | Properties                                   |
/// |-------------|----------------------------------------------|
/// | Company     | Name (abstract)                              |
/// | Customer    | Rating, Visits (transaction-only)            |
/// | Supplier    |                                              |
/// | Order       | OrderNumber, Note (nullable)                 |
/// | OrderItem   | Product, Position                            |
/// | OrderTicket | FileName (nullable)                          |
/// | Official    | Name                                         |
///
/// Relations: `Customer.Orders` / `Order.Customer` (mandatory),
/// `Order.OrderItems` / `OrderItem.Order`, `Order.OrderTicket` /
/// `OrderTicket.Order` (one-to-one) and `Official.Orders` /
/// `Order.Official` (the collection side is read-only).
pub fn sales_mapping() -> Arc<MappingConfiguration> {
    let mapping = MappingBuilder::new()
        .class(
            ClassBuilder::new("Company")
                .abstract_class()
                .property(PropertyDefinition::new("Name", ValueType::Text)),
        )
        .class(
            ClassBuilder::new("Customer")
                .base("Company")
                .property(PropertyDefinition::new("Rating", ValueType::Integer))
                .property(PropertyDefinition::new("Visits", ValueType::Integer).transaction_only()),
        )
        .class(ClassBuilder::new("Supplier").base("Company"))
        .class(
            ClassBuilder::new("Order")
                .property(PropertyDefinition::new("OrderNumber", ValueType::Integer))
                .property(PropertyDefinition::new("Note", ValueType::Text).nullable()),
        )
        .class(
            ClassBuilder::new("OrderItem")
                .property(PropertyDefinition::new("Product", ValueType::Text))
                .property(PropertyDefinition::new("Position", ValueType::Integer)),
        )
        .class(
            ClassBuilder::new("OrderTicket")
                .property(PropertyDefinition::new("FileName", ValueType::Text).nullable()),
        )
        .class(
            ClassBuilder::new("Official")
                .property(PropertyDefinition::new("Name", ValueType::Text)),
        )
        .relation(Relation::one_to_many("Customer", "Orders", "Order", "Customer").mandatory())
        .one_to_many("Order", "OrderItems", "OrderItem", "Order")
        .one_to_one("Order", "OrderTicket", "OrderTicket", "Order")
        .relation(Relation::one_to_many("Official", "Orders", "Order", "Official").read_only())
        .build()
        .expect("sales mapping is invalid");
    Arc::new(mapping)
}

/// Returns an integer-keyed object id.
pub fn object_id(class: &str, key: i64) -> ObjectId {
    ObjectId::new(class, StorageKey::Integer(key))
}

/// The records of the seeded sales data.
///
/// - Customer 1 "Acme" and customer 2 "Globex"
/// - Official 1 "Miller"
/// - Order 1 (Acme, Miller) with items 1 and 2 and ticket 1
/// - Order 2 (Acme) with no items
pub fn sales_records() -> Vec<StoredRecord> {
    let acme = object_id("Customer", 1);
    let order1 = object_id("Order", 1);
    vec![
        StoredRecord::new(acme.clone(), Default::default())
            .with("Name", "Acme")
            .with("Rating", 3_i64),
        StoredRecord::new(object_id("Customer", 2), Default::default())
            .with("Name", "Globex")
            .with("Rating", 1_i64),
        StoredRecord::new(object_id("Official", 1), Default::default()).with("Name", "Miller"),
        StoredRecord::new(order1.clone(), Default::default())
            .with("OrderNumber", 1_i64)
            .with("Customer", acme.clone())
            .with("Official", object_id("Official", 1)),
        StoredRecord::new(object_id("Order", 2), Default::default())
            .with("OrderNumber", 2_i64)
            .with("Customer", acme),
        StoredRecord::new(object_id("OrderItem", 1), Default::default())
            .with("Product", "Mainboard")
            .with("Position", 1_i64)
            .with("Order", order1.clone()),
        StoredRecord::new(object_id("OrderItem", 2), Default::default())
            .with("Product", "CPU")
            .with("Position", 2_i64)
            .with("Order", order1.clone()),
        StoredRecord::new(object_id("OrderTicket", 1), Default::default())
            .with("FileName", "order1.pdf")
            .with("Order", order1),
    ]
}

/// The sales mapping with seeded in-memory storage.
pub struct SalesFixture {
    /// The mapping.
    pub mapping: Arc<MappingConfiguration>,
    /// The seeded storage.
    pub storage: Arc<InMemoryStorage>,
    /// Customer 1, "Acme".
    pub acme: ObjectId,
    /// Customer 2, "Globex".
    pub globex: ObjectId,
    /// Official 1.
    pub official: ObjectId,
    /// Order 1, with items and a ticket.
    pub order1: ObjectId,
    /// Order 2, without items.
    pub order2: ObjectId,
    /// The items of order 1, by position.
    pub items: [ObjectId; 2],
    /// The ticket of order 1.
    pub ticket: ObjectId,
}

impl SalesFixture {
    /// Creates the fixture with freshly seeded storage.
    ///
    /// Installs the test tracing subscriber on first use.
    pub fn new() -> Self {
        crate::logging::init_tracing();
        let storage = Arc::new(InMemoryStorage::new());
        let records = sales_records();
        tracing::debug!(records = records.len(), "seeding sales storage");
        storage.seed(records);
        Self {
            mapping: sales_mapping(),
            storage,
            acme: object_id("Customer", 1),
            globex: object_id("Customer", 2),
            official: object_id("Official", 1),
            order1: object_id("Order", 1),
            order2: object_id("Order", 2),
            items: [object_id("OrderItem", 1), object_id("OrderItem", 2)],
            ticket: object_id("OrderTicket", 1),
        }
    }

    /// Returns the storage as a provider trait object.
    pub fn provider(&self) -> Arc<dyn StorageProvider> {
        self.storage.clone()
    }

    /// Creates a root transaction with the default configuration.
    pub fn root_transaction(&self) -> ClientTransaction {
        self.root_transaction_with(Config::default())
    }

    /// Creates a root transaction with `config`.
    pub fn root_transaction_with(&self, config: Config) -> ClientTransaction {
        ClientTransaction::create_root_transaction_with_config(
            Arc::clone(&self.mapping),
            self.provider(),
            config,
        )
        .expect("Failed to create root transaction")
    }
}

impl Default for SalesFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// File-backed sales storage with automatic cleanup.
pub struct TestFileStorage {
    /// The storage instance.
    pub storage: Arc<FileStorage>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestFileStorage {
    /// Opens an empty file storage in a new temporary directory.
    pub fn empty() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = FileStorage::open(&temp_dir.path().join("objects.cbor"))
            .expect("Failed to open file storage");
        Self {
            storage: Arc::new(storage),
            temp_dir,
        }
    }

    /// Opens the storage file again, as a second process would.
    pub fn reopen(&self) -> Arc<FileStorage> {
        Arc::new(FileStorage::open(&self.path()).expect("Failed to reopen file storage"))
    }

    /// Returns the path of the storage file.
    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().join("objects.cbor")
    }
}

/// Runs a test with a root transaction over freshly seeded sales data.
///
/// # Example
///
/// ```rust,ignore
/// use domobj_testkit::with_sales_transaction;
///
/// #[test]
/// fn my_test() {
///     with_sales_transaction(|fixture, tx| {
///         let order = tx.get_object(&fixture.order1).unwrap();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_sales_transaction<F, R>(f: F) -> R
where
    F: FnOnce(&SalesFixture, &ClientTransaction) -> R,
{
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    f(&fixture, &tx)
}
