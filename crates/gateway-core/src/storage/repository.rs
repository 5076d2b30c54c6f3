use std::{collections::HashMap, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};

use super::{
    IpInfo, MethodLatency, NewPeer, Peer, PeerCapabilities, PeerStatus, RequestStat, StorageError,
};

/// Schema applied by [`SqliteRepository::init_schema`]. Idempotent.
pub const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS peers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        blockchain TEXT NOT NULL,
        address TEXT NOT NULL,
        port INTEGER NOT NULL,
        version TEXT,
        node_pubkey TEXT,
        is_rpc BOOLEAN NOT NULL DEFAULT 0,
        is_alive BOOLEAN NOT NULL DEFAULT 0,
        is_ssl BOOLEAN NOT NULL DEFAULT 0,
        is_mainnet BOOLEAN NOT NULL DEFAULT 0,
        is_validator BOOLEAN NOT NULL DEFAULT 0,
        is_outdated BOOLEAN NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(blockchain, address)
    );

    CREATE TABLE IF NOT EXISTS methods (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        blockchain TEXT NOT NULL,
        name TEXT NOT NULL,
        UNIQUE(blockchain, name)
    );

    CREATE TABLE IF NOT EXISTS peer_methods (
        peer_id INTEGER NOT NULL,
        method_id INTEGER NOT NULL,
        response_time_ms INTEGER NOT NULL,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (peer_id, method_id),
        FOREIGN KEY (peer_id) REFERENCES peers(id) ON DELETE CASCADE,
        FOREIGN KEY (method_id) REFERENCES methods(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS peer_ip_info (
        peer_id INTEGER PRIMARY KEY,
        netmask TEXT,
        asn INTEGER,
        isp TEXT,
        country TEXT,
        FOREIGN KEY (peer_id) REFERENCES peers(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS request_stats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TIMESTAMP NOT NULL,
        methods TEXT NOT NULL,
        endpoint TEXT,
        attempts INTEGER NOT NULL,
        response_time_ms INTEGER NOT NULL,
        http_status INTEGER NOT NULL,
        user_error BOOLEAN NOT NULL,
        error_code INTEGER
    );

    CREATE INDEX IF NOT EXISTS idx_peers_blockchain ON peers(blockchain);
    CREATE INDEX IF NOT EXISTS idx_request_stats_timestamp ON request_stats(timestamp);
";

/// Repository for peers, their capabilities, and request stats.
///
/// Shared by the scanner (writes), the endpoint refresher (reads), and the stats
/// collector (appends).
#[async_trait]
pub trait PeerRepository: Send + Sync {
    /// Inserts missing catalog entries for `blockchain`.
    async fn seed_methods(&self, blockchain: &str, methods: &[&str]) -> Result<(), StorageError>;

    /// Catalog method names for `blockchain`, sorted.
    async fn list_methods(&self, blockchain: &str) -> Result<Vec<String>, StorageError>;

    async fn list_peers(&self, blockchain: &str) -> Result<Vec<Peer>, StorageError>;

    /// Peers that are alive and on the expected network; discovery sources.
    async fn list_alive_mainnet_peers(&self, blockchain: &str) -> Result<Vec<Peer>, StorageError>;

    async fn get_peer(&self, id: i64) -> Result<Option<Peer>, StorageError>;

    /// Inserts a peer unless (blockchain, address) exists. Returns the row id either way.
    async fn insert_peer(&self, peer: &NewPeer) -> Result<i64, StorageError>;

    /// Updates version and identity key after gossip drift.
    async fn update_peer_identity(
        &self,
        id: i64,
        version: Option<&str>,
        node_pubkey: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Applies the outcome of one scan cycle.
    async fn update_peer_status(&self, id: i64, status: &PeerStatus) -> Result<(), StorageError>;

    async fn set_peer_outdated(&self, id: i64, outdated: bool) -> Result<(), StorageError>;

    /// Records that `method` worked on the peer with this latency.
    async fn upsert_peer_method(
        &self,
        peer_id: i64,
        method: &str,
        response_time_ms: i64,
    ) -> Result<(), StorageError>;

    async fn delete_peer_method(&self, peer_id: i64, method: &str) -> Result<(), StorageError>;

    /// Removes every capability row of the peer.
    async fn delete_peer_methods(&self, peer_id: i64) -> Result<(), StorageError>;

    async fn upsert_ip_info(&self, peer_id: i64, info: &IpInfo) -> Result<(), StorageError>;

    async fn get_ip_info(&self, peer_id: i64) -> Result<Option<IpInfo>, StorageError>;

    /// Every peer of `blockchain` with its capability set.
    async fn peer_capabilities(&self, blockchain: &str)
        -> Result<Vec<PeerCapabilities>, StorageError>;

    /// Appends stats in one transaction. Returns the number of rows written.
    async fn insert_request_stats(&self, stats: &[RequestStat]) -> Result<u64, StorageError>;

    async fn count_request_stats(&self) -> Result<i64, StorageError>;
}

pub struct SqliteRepository {
    pool: Pool<Sqlite>,
}

impl SqliteRepository {
    /// Connects with foreign keys enabled. In-memory databases get a single
    /// connection that is never recycled, so every query sees the same database.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Database` if the URL is invalid or connection fails.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .foreign_keys(true)
            .create_if_missing(true);

        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new().max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Creates missing tables and indexes.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Database` if a statement fails.
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Extracts a non-nullable field from a database row.
    fn get_required<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, StorageError>
    where
        T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
    {
        row.try_get::<T, _>(column)
            .map_err(|e| StorageError::CorruptRow(format!("column '{column}': {e}")))
    }

    fn get_port(row: &SqliteRow) -> Result<u16, StorageError> {
        let value: i64 = Self::get_required(row, "port")?;
        u16::try_from(value)
            .map_err(|e| StorageError::CorruptRow(format!("port {value} out of range: {e}")))
    }

    fn row_to_peer(row: &SqliteRow) -> Result<Peer, StorageError> {
        Ok(Peer {
            id: Self::get_required(row, "id")?,
            blockchain: Self::get_required(row, "blockchain")?,
            address: Self::get_required(row, "address")?,
            port: Self::get_port(row)?,
            version: row.try_get::<Option<String>, _>("version")?,
            node_pubkey: row.try_get::<Option<String>, _>("node_pubkey")?,
            is_rpc: Self::get_required(row, "is_rpc")?,
            is_alive: Self::get_required(row, "is_alive")?,
            is_ssl: Self::get_required(row, "is_ssl")?,
            is_mainnet: Self::get_required(row, "is_mainnet")?,
            is_validator: Self::get_required(row, "is_validator")?,
            is_outdated: Self::get_required(row, "is_outdated")?,
            updated_at: DateTime::from_naive_utc_and_offset(
                Self::get_required::<NaiveDateTime>(row, "updated_at")?,
                Utc,
            ),
        })
    }
}

const PEER_COLUMNS: &str = r"
    id, blockchain, address, port, version, node_pubkey,
    is_rpc, is_alive, is_ssl, is_mainnet, is_validator, is_outdated, updated_at
";

#[async_trait]
impl PeerRepository for SqliteRepository {
    async fn seed_methods(&self, blockchain: &str, methods: &[&str]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for method in methods {
            sqlx::query(
                r"
                INSERT INTO methods (blockchain, name) VALUES (?, ?)
                ON CONFLICT(blockchain, name) DO NOTHING
                ",
            )
            .bind(blockchain)
            .bind(*method)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_methods(&self, blockchain: &str) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT name FROM methods WHERE blockchain = ? ORDER BY name")
            .bind(blockchain)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| Self::get_required(row, "name")).collect()
    }

    async fn list_peers(&self, blockchain: &str) -> Result<Vec<Peer>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {PEER_COLUMNS} FROM peers WHERE blockchain = ? ORDER BY id"
        ))
        .bind(blockchain)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_peer).collect()
    }

    async fn list_alive_mainnet_peers(&self, blockchain: &str) -> Result<Vec<Peer>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {PEER_COLUMNS} FROM peers
            WHERE blockchain = ? AND is_alive = 1 AND is_mainnet = 1
            ORDER BY id
            "
        ))
        .bind(blockchain)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_peer).collect()
    }

    async fn get_peer(&self, id: i64) -> Result<Option<Peer>, StorageError> {
        let row = sqlx::query(&format!("SELECT {PEER_COLUMNS} FROM peers WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::row_to_peer(&row)).transpose()
    }

    async fn insert_peer(&self, peer: &NewPeer) -> Result<i64, StorageError> {
        sqlx::query(
            r"
            INSERT INTO peers (blockchain, address, port, version, node_pubkey, is_ssl)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(blockchain, address) DO NOTHING
            ",
        )
        .bind(&peer.blockchain)
        .bind(&peer.address)
        .bind(i64::from(peer.port))
        .bind(&peer.version)
        .bind(&peer.node_pubkey)
        .bind(peer.is_ssl)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id FROM peers WHERE blockchain = ? AND address = ?")
            .bind(&peer.blockchain)
            .bind(&peer.address)
            .fetch_one(&self.pool)
            .await?;

        Self::get_required(&row, "id")
    }

    async fn update_peer_identity(
        &self,
        id: i64,
        version: Option<&str>,
        node_pubkey: Option<&str>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            UPDATE peers
            SET version = COALESCE(?, version),
                node_pubkey = COALESCE(?, node_pubkey),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            ",
        )
        .bind(version)
        .bind(node_pubkey)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::PeerNotFound(id));
        }
        Ok(())
    }

    async fn update_peer_status(&self, id: i64, status: &PeerStatus) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            UPDATE peers
            SET is_alive = ?,
                is_mainnet = COALESCE(?, is_mainnet),
                is_rpc = ?,
                is_validator = ?,
                version = COALESCE(?, version),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            ",
        )
        .bind(status.is_alive)
        .bind(status.is_mainnet)
        .bind(status.is_rpc)
        .bind(status.is_validator)
        .bind(&status.version)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::PeerNotFound(id));
        }
        Ok(())
    }

    async fn set_peer_outdated(&self, id: i64, outdated: bool) -> Result<(), StorageError> {
        sqlx::query("UPDATE peers SET is_outdated = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(outdated)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_peer_method(
        &self,
        peer_id: i64,
        method: &str,
        response_time_ms: i64,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO methods (blockchain, name)
            SELECT blockchain, ? FROM peers WHERE id = ?
            ON CONFLICT(blockchain, name) DO NOTHING
            ",
        )
        .bind(method)
        .bind(peer_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r"
            INSERT INTO peer_methods (peer_id, method_id, response_time_ms, updated_at)
            SELECT p.id, m.id, ?, CURRENT_TIMESTAMP
            FROM peers p JOIN methods m ON m.blockchain = p.blockchain
            WHERE p.id = ? AND m.name = ?
            ON CONFLICT(peer_id, method_id) DO UPDATE SET
                response_time_ms = excluded.response_time_ms,
                updated_at = excluded.updated_at
            ",
        )
        .bind(response_time_ms)
        .bind(peer_id)
        .bind(method)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::PeerNotFound(peer_id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_peer_method(&self, peer_id: i64, method: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
            DELETE FROM peer_methods
            WHERE peer_id = ?
              AND method_id IN (
                SELECT m.id FROM methods m JOIN peers p ON m.blockchain = p.blockchain
                WHERE p.id = ? AND m.name = ?
              )
            ",
        )
        .bind(peer_id)
        .bind(peer_id)
        .bind(method)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_peer_methods(&self, peer_id: i64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM peer_methods WHERE peer_id = ?")
            .bind(peer_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_ip_info(&self, peer_id: i64, info: &IpInfo) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO peer_ip_info (peer_id, netmask, asn, isp, country)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(peer_id) DO UPDATE SET
                netmask = excluded.netmask,
                asn = excluded.asn,
                isp = excluded.isp,
                country = excluded.country
            ",
        )
        .bind(peer_id)
        .bind(&info.netmask)
        .bind(info.asn)
        .bind(&info.isp)
        .bind(&info.country)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_ip_info(&self, peer_id: i64) -> Result<Option<IpInfo>, StorageError> {
        let row = sqlx::query(
            "SELECT netmask, asn, isp, country FROM peer_ip_info WHERE peer_id = ?",
        )
        .bind(peer_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<IpInfo, StorageError> {
            Ok(IpInfo {
                netmask: row.try_get("netmask")?,
                asn: row.try_get("asn")?,
                isp: row.try_get("isp")?,
                country: row.try_get("country")?,
            })
        })
        .transpose()
    }

    async fn peer_capabilities(
        &self,
        blockchain: &str,
    ) -> Result<Vec<PeerCapabilities>, StorageError> {
        let peers = self.list_peers(blockchain).await?;

        let rows = sqlx::query(
            r"
            SELECT pm.peer_id, m.name, pm.response_time_ms
            FROM peer_methods pm
            JOIN methods m ON m.id = pm.method_id
            WHERE m.blockchain = ?
            ORDER BY pm.peer_id, m.name
            ",
        )
        .bind(blockchain)
        .fetch_all(&self.pool)
        .await?;

        let mut by_peer: HashMap<i64, Vec<MethodLatency>> = HashMap::new();
        for row in &rows {
            let peer_id: i64 = Self::get_required(row, "peer_id")?;
            by_peer.entry(peer_id).or_default().push(MethodLatency {
                method: Self::get_required(row, "name")?,
                response_time_ms: Self::get_required(row, "response_time_ms")?,
            });
        }

        Ok(peers
            .into_iter()
            .map(|peer| {
                let methods = by_peer.remove(&peer.id).unwrap_or_default();
                PeerCapabilities { peer, methods }
            })
            .collect())
    }

    async fn insert_request_stats(&self, stats: &[RequestStat]) -> Result<u64, StorageError> {
        if stats.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for stat in stats {
            let result = sqlx::query(
                r"
                INSERT INTO request_stats (
                    timestamp, methods, endpoint, attempts, response_time_ms,
                    http_status, user_error, error_code
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(stat.timestamp)
            .bind(&stat.methods)
            .bind(&stat.endpoint)
            .bind(i64::from(stat.attempts))
            .bind(i64::try_from(stat.response_time_ms).unwrap_or(i64::MAX))
            .bind(i64::from(stat.http_status))
            .bind(stat.user_error)
            .bind(stat.error_code)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;

        Ok(written)
    }

    async fn count_request_stats(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM request_stats")
            .fetch_one(&self.pool)
            .await?;
        Self::get_required(&row, "count")
    }
}
