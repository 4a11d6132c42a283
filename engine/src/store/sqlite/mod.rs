use anyhow::{Context as _, Result};
use async_trait::async_trait;
use diesel::{
    connection::SimpleConnection,
    prelude::*,
    r2d2::{ConnectionManager, Pool, PooledConnection},
};

mod models;
mod schema;

use fleetcast_core::state::{TargetStatus, TxStatus};

use self::models::{TargetRow, TransactionRow};
use self::schema::{fleet_targets, fleet_transactions};
use crate::store::{FleetStore, TargetRecord, TransactionRecord, now_secs};

pub struct SqliteFleetStore {
    pool: Pool<ConnectionManager<SqliteConnection>>,
    busy_timeout_ms: i64,
    db_path: String,
}

impl SqliteFleetStore {
    pub fn new(path: &str) -> Result<Self> {
        Self::new_with_busy_timeout(path, 5_000)
    }

    pub fn new_with_busy_timeout(path: &str, busy_timeout_ms: i64) -> Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(path);
        let pool = Pool::builder()
            .max_size(2)
            .build(manager)
            .with_context(|| format!("open sqlite pool (path={path})"))?;
        let mut conn = pool
            .get()
            .with_context(|| format!("open sqlite connection (path={path})"))?;
        initialize_schema(&mut conn).with_context(|| format!("initialize sqlite schema (path={path})"))?;
        apply_pragmas(&mut conn, busy_timeout_ms)
            .with_context(|| format!("apply sqlite pragmas (path={path})"))?;
        Ok(Self {
            pool,
            busy_timeout_ms,
            db_path: path.to_string(),
        })
    }

    fn get_conn(&self) -> Result<PooledConnection<ConnectionManager<SqliteConnection>>> {
        let mut conn = self
            .pool
            .get()
            .with_context(|| format!("open sqlite connection (path={})", self.db_path))?;
        apply_pragmas(&mut conn, self.busy_timeout_ms)
            .with_context(|| format!("apply sqlite pragmas (path={})", self.db_path))?;
        Ok(conn)
    }

    fn tx_to_row(r: &TransactionRecord) -> TransactionRow {
        TransactionRow {
            id: r.id.clone(),
            status: r.status as i32,
            template_json: r.template_json.clone(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }

    fn tx_from_row(r: TransactionRow) -> TransactionRecord {
        TransactionRecord {
            id: r.id,
            status: tx_status_from_i32(r.status),
            template_json: r.template_json,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }

    fn target_to_row(r: &TargetRecord) -> TargetRow {
        TargetRow {
            id: r.id.clone(),
            transaction_id: r.transaction_id.clone(),
            member_id: r.member_id.clone(),
            wallet_address: r.wallet_address.clone(),
            resolved_call_json: r.resolved_call_json.clone(),
            op_handle: r.op_handle.clone(),
            chain_tx_hash: r.chain_tx_hash.clone(),
            status: r.status as i32,
            error: r.error.clone(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }

    fn target_from_row(r: TargetRow) -> TargetRecord {
        TargetRecord {
            id: r.id,
            transaction_id: r.transaction_id,
            member_id: r.member_id,
            wallet_address: r.wallet_address,
            resolved_call_json: r.resolved_call_json,
            op_handle: r.op_handle,
            chain_tx_hash: r.chain_tx_hash,
            status: target_status_from_i32(r.status),
            error: r.error,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

fn tx_status_from_i32(status: i32) -> TxStatus {
    match status {
        0 => TxStatus::Pending,
        1 => TxStatus::Processing,
        2 => TxStatus::Completed,
        _ => TxStatus::Failed,
    }
}

fn target_status_from_i32(status: i32) -> TargetStatus {
    match status {
        0 => TargetStatus::Pending,
        1 => TargetStatus::Submitted,
        2 => TargetStatus::Confirmed,
        _ => TargetStatus::Failed,
    }
}

#[async_trait]
impl FleetStore for SqliteFleetStore {
    async fn create_transaction(&self, row: TransactionRecord) -> Result<()> {
        let mut conn = self.get_conn()?;
        diesel::insert_into(fleet_transactions::table)
            .values(&Self::tx_to_row(&row))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>> {
        let mut conn = self.get_conn()?;
        let res = fleet_transactions::table
            .find(id.to_string())
            .first::<TransactionRow>(&mut conn)
            .optional()?;
        Ok(res.map(Self::tx_from_row))
    }

    async fn update_transaction_status(&self, id: &str, next: TxStatus) -> Result<()> {
        let mut conn = self.get_conn()?;
        diesel::update(fleet_transactions::table.find(id.to_string()))
            .set((
                fleet_transactions::status.eq(next as i32),
                fleet_transactions::updated_at.eq(now_secs()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn create_target(&self, row: TargetRecord) -> Result<()> {
        let mut conn = self.get_conn()?;
        diesel::insert_into(fleet_targets::table)
            .values(&Self::target_to_row(&row))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn update_target(&self, row: TargetRecord) -> Result<()> {
        let mut conn = self.get_conn()?;
        diesel::update(fleet_targets::table.find(row.id.clone()))
            .set(&Self::target_to_row(&row))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn list_targets(&self, transaction_id: &str) -> Result<Vec<TargetRecord>> {
        let mut conn = self.get_conn()?;
        let rows = fleet_targets::table
            .filter(fleet_targets::transaction_id.eq(transaction_id.to_string()))
            .order(fleet_targets::created_at.asc())
            .load::<TargetRow>(&mut conn)?;
        Ok(rows.into_iter().map(Self::target_from_row).collect())
    }

    async fn list_targets_by_status(&self, status: TargetStatus, limit: usize) -> Result<Vec<TargetRecord>> {
        let mut conn = self.get_conn()?;
        let rows = fleet_targets::table
            .filter(fleet_targets::status.eq(status as i32))
            .order(fleet_targets::created_at.asc())
            .limit(limit as i64)
            .load::<TargetRow>(&mut conn)?;
        Ok(rows.into_iter().map(Self::target_from_row).collect())
    }
}

pub fn initialize_schema(conn: &mut SqliteConnection) -> Result<()> {
    conn.batch_execute(
        r#"
        CREATE TABLE IF NOT EXISTS fleet_transactions (
            id TEXT NOT NULL,
            status INTEGER NOT NULL,
            template_json TEXT NOT NULL,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL,
            PRIMARY KEY (id)
        );

        CREATE TABLE IF NOT EXISTS fleet_targets (
            id TEXT NOT NULL,
            transaction_id TEXT NOT NULL,
            member_id TEXT NOT NULL,
            wallet_address TEXT NOT NULL,
            resolved_call_json TEXT,
            op_handle TEXT,
            chain_tx_hash TEXT,
            status INTEGER NOT NULL,
            error TEXT,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL,
            PRIMARY KEY (id)
        );
        CREATE INDEX IF NOT EXISTS idx_target_tx ON fleet_targets(transaction_id);
        CREATE INDEX IF NOT EXISTS idx_target_status ON fleet_targets(status);
    "#,
    )?;
    Ok(())
}

pub fn apply_pragmas(conn: &mut SqliteConnection, busy_timeout_ms: i64) -> Result<()> {
    conn.batch_execute(&format!(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;
        PRAGMA busy_timeout={};
    "#,
        busy_timeout_ms
    ))?;
    Ok(())
}
