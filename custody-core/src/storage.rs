//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `events` - Append-only custody event log (key: event_id)
//! - `orders` - Order projections (key: order_id)
//! - `bundles` - Rider bundles (key: bundle_id)
//! - `superbundles` - ASM superbundles (key: superbundle_id)
//! - `deposits` - Bank deposits (key: deposit_id)
//! - `indices` - Secondary indices (order_id || event_id)

use crate::{
    error::{Error, Result},
    types::{CustodyEvent, Deposit, Order, RiderBundle, Superbundle},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode, Options, WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_EVENTS: &str = "events";
const CF_ORDERS: &str = "orders";
const CF_BUNDLES: &str = "bundles";
const CF_SUPERBUNDLES: &str = "superbundles";
const CF_DEPOSITS: &str = "deposits";
const CF_INDICES: &str = "indices";

/// Everything one atomic commit writes
///
/// Events have already been run through the reducer; `orders` carries the
/// resulting projections alongside any aggregation records.
#[derive(Debug, Default)]
pub struct WriteSet {
    /// New custody events to append
    pub events: Vec<CustodyEvent>,
    /// Order projections to upsert
    pub orders: Vec<Order>,
    /// Bundles to upsert
    pub bundles: Vec<RiderBundle>,
    /// Superbundles to upsert
    pub superbundles: Vec<Superbundle>,
    /// Deposits to upsert
    pub deposits: Vec<Deposit>,
}

impl WriteSet {
    /// Whether there is anything to write
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.orders.is_empty()
            && self.bundles.is_empty()
            && self.superbundles.is_empty()
            && self.deposits.is_empty()
    }
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy event log
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
            ColumnFamilyDescriptor::new(CF_ORDERS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_BUNDLES, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_SUPERBUNDLES, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_DEPOSITS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened custody RocksDB");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        // Projections are read-heavy, LZ4 keeps reads cheap
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Event operations

    /// Get event by ID
    pub fn get_event(&self, event_id: Uuid) -> Result<CustodyEvent> {
        let cf = self.cf_handle(CF_EVENTS)?;

        let value = self
            .db
            .get_cf(cf, event_id.as_bytes())?
            .ok_or_else(|| Error::EventNotFound(event_id.to_string()))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Get events for an order, oldest first (via index scan)
    pub fn get_order_events(&self, order_id: Uuid) -> Result<Vec<CustodyEvent>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let prefix = order_id.as_bytes();
        let iter = self.db.prefix_iterator_cf(cf_indices, prefix);

        let mut events = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }

            // Key layout: order_id (16) || event_id (16)
            if key.len() >= 32 {
                let event_id_bytes: [u8; 16] = key[16..32]
                    .try_into()
                    .map_err(|_| Error::Storage("malformed index key".to_string()))?;
                events.push(self.get_event(Uuid::from_bytes(event_id_bytes))?);
            }
        }

        // UUIDv7 event ids sort by creation time
        events.sort_by_key(|e| e.event_id);
        Ok(events)
    }

    // Order operations

    /// Upsert an order projection
    pub fn put_order(&self, order: &Order) -> Result<()> {
        let cf = self.cf_handle(CF_ORDERS)?;
        let value = bincode::serialize(order)?;
        self.db.put_cf(cf, order.order_id.as_bytes(), &value)?;
        Ok(())
    }

    /// Get an order by ID
    pub fn get_order(&self, order_id: Uuid) -> Result<Order> {
        let cf = self.cf_handle(CF_ORDERS)?;

        let value = self
            .db
            .get_cf(cf, order_id.as_bytes())?
            .ok_or_else(|| Error::OrderNotFound(order_id.to_string()))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Full order scan
    pub fn list_orders(&self) -> Result<Vec<Order>> {
        let cf = self.cf_handle(CF_ORDERS)?;

        let mut orders = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            orders.push(bincode::deserialize(&value)?);
        }
        Ok(orders)
    }

    // Aggregation records

    /// Get a bundle by ID
    pub fn get_bundle(&self, bundle_id: Uuid) -> Result<RiderBundle> {
        let cf = self.cf_handle(CF_BUNDLES)?;

        let value = self
            .db
            .get_cf(cf, bundle_id.as_bytes())?
            .ok_or_else(|| Error::BundleNotFound(bundle_id.to_string()))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Get a superbundle by ID
    pub fn get_superbundle(&self, superbundle_id: Uuid) -> Result<Superbundle> {
        let cf = self.cf_handle(CF_SUPERBUNDLES)?;

        let value = self
            .db
            .get_cf(cf, superbundle_id.as_bytes())?
            .ok_or_else(|| Error::SuperbundleNotFound(superbundle_id.to_string()))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Get a deposit by ID
    pub fn get_deposit(&self, deposit_id: Uuid) -> Result<Deposit> {
        let cf = self.cf_handle(CF_DEPOSITS)?;

        let value = self
            .db
            .get_cf(cf, deposit_id.as_bytes())?
            .ok_or_else(|| Error::DepositNotFound(deposit_id.to_string()))?;

        Ok(bincode::deserialize(&value)?)
    }

    // Batch operations (atomic)

    /// Write a full commit atomically
    pub fn write_set(&self, set: &WriteSet) -> Result<()> {
        if set.is_empty() {
            return Ok(());
        }

        let mut batch = WriteBatch::default();

        let cf_events = self.cf_handle(CF_EVENTS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        for event in &set.events {
            let value = bincode::serialize(event)?;
            batch.put_cf(cf_events, event.event_id.as_bytes(), &value);

            // Index: order_id || event_id -> empty
            batch.put_cf(cf_indices, Self::index_key(event.order_id, event.event_id), []);
        }

        let cf_orders = self.cf_handle(CF_ORDERS)?;
        for order in &set.orders {
            let value = bincode::serialize(order)?;
            batch.put_cf(cf_orders, order.order_id.as_bytes(), &value);
        }

        let cf_bundles = self.cf_handle(CF_BUNDLES)?;
        for bundle in &set.bundles {
            let value = bincode::serialize(bundle)?;
            batch.put_cf(cf_bundles, bundle.bundle_id.as_bytes(), &value);
        }

        let cf_superbundles = self.cf_handle(CF_SUPERBUNDLES)?;
        for superbundle in &set.superbundles {
            let value = bincode::serialize(superbundle)?;
            batch.put_cf(cf_superbundles, superbundle.superbundle_id.as_bytes(), &value);
        }

        let cf_deposits = self.cf_handle(CF_DEPOSITS)?;
        for deposit in &set.deposits {
            let value = bincode::serialize(deposit)?;
            batch.put_cf(cf_deposits, deposit.deposit_id.as_bytes(), &value);
        }

        self.db.write(batch)?;

        tracing::debug!(
            events = set.events.len(),
            orders = set.orders.len(),
            bundles = set.bundles.len(),
            superbundles = set.superbundles.len(),
            deposits = set.deposits.len(),
            "Commit written"
        );

        Ok(())
    }

    fn index_key(order_id: Uuid, event_id: Uuid) -> Vec<u8> {
        let mut key = order_id.as_bytes().to_vec();
        key.extend_from_slice(event_id.as_bytes());
        key
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("Custody RocksDB closed");
        Ok(())
    }
}
