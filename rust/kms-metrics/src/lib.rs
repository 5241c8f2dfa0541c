#![warn(missing_docs)]

//! Prometheus instrumentation for the KMS.
//!
//! [`KmsMetrics`] registers its histograms with a caller supplied
//! [`Registry`] and is cheap to clone, so one instance can be handed to every
//! component that signs, stores or resolves keys. Observation methods take
//! `&self` and are safe to call concurrently.
//!
//! | Metric | Labels |
//! |--------|--------|
//! | `kms_crypto_sign_seconds` | |
//! | `kms_db_{put,get,get_tags,get_bulk,query,delete,batch}_seconds` | `type` = `CouchDB`, `MongoDB`, `EDV` |
//! | `kms_key_store_resolve_seconds` | |
//! | `kms_key_store_get_key_seconds` | |

use prometheus::{Encoder, Histogram, HistogramOpts, HistogramVec, Registry, TextEncoder};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

const NAMESPACE: &str = "kms";

/// Errors raised while registering or exporting metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The registry refused a collector, usually because of a name clash.
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// The text exposition was not valid UTF-8.
    #[error("Metrics exposition is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Storage backends whose operations are timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbBackend {
    /// Apache CouchDB.
    CouchDb,
    /// MongoDB.
    MongoDb,
    /// Encrypted data vault.
    Edv,
}

impl DbBackend {
    /// Every backend, in index order.
    pub const ALL: [DbBackend; 3] = [DbBackend::CouchDb, DbBackend::MongoDb, DbBackend::Edv];

    /// Value of the `type` label.
    pub const fn as_str(self) -> &'static str {
        match self {
            DbBackend::CouchDb => "CouchDB",
            DbBackend::MongoDb => "MongoDB",
            DbBackend::Edv => "EDV",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Storage operations whose latency is timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbOperation {
    /// Store a value.
    Put,
    /// Fetch a value.
    Get,
    /// Fetch the tags of a value.
    GetTags,
    /// Fetch many values at once.
    GetBulk,
    /// Run a query.
    Query,
    /// Delete a value.
    Delete,
    /// Apply a batch of operations.
    Batch,
}

impl DbOperation {
    /// Every operation, in index order.
    pub const ALL: [DbOperation; 7] = [
        DbOperation::Put,
        DbOperation::Get,
        DbOperation::GetTags,
        DbOperation::GetBulk,
        DbOperation::Query,
        DbOperation::Delete,
        DbOperation::Batch,
    ];

    const fn metric_name(self) -> &'static str {
        match self {
            DbOperation::Put => "put_seconds",
            DbOperation::Get => "get_seconds",
            DbOperation::GetTags => "get_tags_seconds",
            DbOperation::GetBulk => "get_bulk_seconds",
            DbOperation::Query => "query_seconds",
            DbOperation::Delete => "delete_seconds",
            DbOperation::Batch => "batch_seconds",
        }
    }

    const fn help(self) -> &'static str {
        match self {
            DbOperation::Put => "The time (in seconds) it takes the DB to store data.",
            DbOperation::Get => "The time (in seconds) it takes the DB to get data.",
            DbOperation::GetTags => "The time (in seconds) it takes the DB to get tags.",
            DbOperation::GetBulk => "The time (in seconds) it takes the DB to get bulk.",
            DbOperation::Query => "The time (in seconds) it takes the DB to query.",
            DbOperation::Delete => "The time (in seconds) it takes the DB to delete.",
            DbOperation::Batch => "The time (in seconds) it takes the DB to batch.",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Latency histograms for KMS operations.
#[derive(Clone)]
pub struct KmsMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    crypto_sign: Histogram,
    db: [[Histogram; DbBackend::ALL.len()]; DbOperation::ALL.len()],
    key_store_resolve: Histogram,
    key_store_get_key: Histogram,
}

impl std::fmt::Debug for KmsMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsMetrics")
            .field("sign_samples", &self.inner.crypto_sign.get_sample_count())
            .finish()
    }
}

impl KmsMetrics {
    /// Create every histogram and register it with `registry`.
    ///
    /// # Errors
    ///
    /// Fails when the registry already holds collectors with the same names.
    pub fn register(registry: &Registry) -> Result<Self, MetricsError> {
        let crypto_sign = histogram(
            registry,
            "crypto",
            "sign_seconds",
            "The time (in seconds) that it takes to sign message.",
        )?;

        let mut per_operation = Vec::with_capacity(DbOperation::ALL.len());
        for operation in DbOperation::ALL {
            let opts = HistogramOpts::new(operation.metric_name(), operation.help())
                .namespace(NAMESPACE)
                .subsystem("db");
            let vec = HistogramVec::new(opts, &["type"])?;
            registry.register(Box::new(vec.clone()))?;
            per_operation.push(vec);
        }
        let db = std::array::from_fn(|operation| {
            std::array::from_fn(|backend| {
                per_operation[operation].with_label_values(&[DbBackend::ALL[backend].as_str()])
            })
        });

        let key_store_resolve = histogram(
            registry,
            "key_store",
            "resolve_seconds",
            "The time (in seconds) it takes to resolve a key store.",
        )?;
        let key_store_get_key = histogram(
            registry,
            "key_store",
            "get_key_seconds",
            "The time (in seconds) it takes to get a key from a key store.",
        )?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry: registry.clone(),
                crypto_sign,
                db,
                key_store_resolve,
                key_store_get_key,
            }),
        })
    }

    /// The registry the histograms live in.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record how long a signing operation took.
    pub fn crypto_sign_time(&self, value: Duration) {
        self.inner.crypto_sign.observe(value.as_secs_f64());
        tracing::debug!(?value, "Sign time");
    }

    /// Record how long a storage operation took on `backend`.
    pub fn db_time(&self, operation: DbOperation, backend: DbBackend, value: Duration) {
        self.inner.db[operation.index()][backend.index()].observe(value.as_secs_f64());
    }

    /// Record how long storing data took.
    pub fn db_put_time(&self, backend: DbBackend, value: Duration) {
        self.db_time(DbOperation::Put, backend, value);
    }

    /// Record how long fetching data took.
    pub fn db_get_time(&self, backend: DbBackend, value: Duration) {
        self.db_time(DbOperation::Get, backend, value);
    }

    /// Record how long fetching tags took.
    pub fn db_get_tags_time(&self, backend: DbBackend, value: Duration) {
        self.db_time(DbOperation::GetTags, backend, value);
    }

    /// Record how long a bulk fetch took.
    pub fn db_get_bulk_time(&self, backend: DbBackend, value: Duration) {
        self.db_time(DbOperation::GetBulk, backend, value);
    }

    /// Record how long a query took.
    pub fn db_query_time(&self, backend: DbBackend, value: Duration) {
        self.db_time(DbOperation::Query, backend, value);
    }

    /// Record how long a delete took.
    pub fn db_delete_time(&self, backend: DbBackend, value: Duration) {
        self.db_time(DbOperation::Delete, backend, value);
    }

    /// Record how long a batch took.
    pub fn db_batch_time(&self, backend: DbBackend, value: Duration) {
        self.db_time(DbOperation::Batch, backend, value);
    }

    /// Record how long resolving a key store took.
    pub fn key_store_resolve_time(&self, value: Duration) {
        self.inner.key_store_resolve.observe(value.as_secs_f64());
        tracing::debug!(?value, "Keystore resolve time");
    }

    /// Record how long fetching a key from a key store took.
    pub fn key_store_get_key_time(&self, value: Duration) {
        self.inner.key_store_get_key.observe(value.as_secs_f64());
        tracing::debug!(?value, "Keystore get key time");
    }

    /// Render every metric in the registry in the Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn histogram(
    registry: &Registry,
    subsystem: &str,
    name: &str,
    help: &str,
) -> Result<Histogram, MetricsError> {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(name, help)
            .namespace(NAMESPACE)
            .subsystem(subsystem),
    )?;
    registry.register(Box::new(histogram.clone()))?;
    Ok(histogram)
}
