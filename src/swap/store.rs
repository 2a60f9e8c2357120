use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context as _, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension as _, Row, params, params_from_iter};

use super::{AutoReverseSubmarineSwap, ReverseSubmarineSwap, SubmarineSwap, SwapStatus};

/// Durable swap records. All mutations are single-record updates.
pub trait SwapStore: Send + Sync {
    fn insert_submarine_swap(&self, swap: &SubmarineSwap) -> Result<()>;
    fn get_submarine_swap(&self, id: &str) -> Result<Option<SubmarineSwap>>;
    fn get_submarine_swap_by_payment_hash(&self, payment_hash: &str)
    -> Result<Option<SubmarineSwap>>;
    fn list_submarine_swaps(&self, wallets: &[String]) -> Result<Vec<SubmarineSwap>>;
    fn list_pending_submarine_swaps(&self) -> Result<Vec<SubmarineSwap>>;

    fn insert_reverse_swap(&self, swap: &ReverseSubmarineSwap) -> Result<()>;
    fn get_reverse_swap(&self, id: &str) -> Result<Option<ReverseSubmarineSwap>>;
    fn list_reverse_swaps(&self, wallets: &[String]) -> Result<Vec<ReverseSubmarineSwap>>;
    fn list_pending_reverse_swaps(&self) -> Result<Vec<ReverseSubmarineSwap>>;

    fn insert_auto_swap(&self, swap: &AutoReverseSubmarineSwap) -> Result<()>;
    fn get_auto_swap(&self, id: &str) -> Result<Option<AutoReverseSubmarineSwap>>;
    fn get_auto_swap_by_wallet(&self, wallet: &str) -> Result<Option<AutoReverseSubmarineSwap>>;
    fn list_auto_swaps(&self, wallets: &[String]) -> Result<Vec<AutoReverseSubmarineSwap>>;
    fn update_auto_swap_count(&self, id: &str, count: u64) -> Result<()>;
    /// Returns false if no configuration had that id.
    fn delete_auto_swap(&self, id: &str) -> Result<bool>;

    /// Moves a pending swap of either kind to a terminal status.
    ///
    /// Returns false when the swap had already left pending; the stored status
    /// is then left untouched. Errors if no swap has that id.
    fn update_swap_status(&self, id: &str, status: SwapStatus) -> Result<bool>;
}

const SUBMARINE_COLUMNS: &str = r#"
  id,
  wallet,
  asset,
  amount,
  direction,
  feerate,
  feerate_value,
  payment_hash,
  created_at,
  status,
  refund_privkey,
  refund_address,
  boltz_id,
  expected_amount,
  timeout_block_height,
  address,
  bip21,
  redeem_script,
  blinding_key
"#;

const REVERSE_COLUMNS: &str = r#"
  id,
  wallet,
  asset,
  amount,
  direction,
  feerate,
  feerate_value,
  onchain_address,
  instant_settlement,
  created_at,
  status,
  boltz_id,
  preimage,
  claim_privkey,
  lockup_address,
  invoice,
  onchain_amount,
  timeout_block_height,
  redeem_script,
  blinding_key
"#;

const AUTO_COLUMNS: &str = r#"
  id,
  wallet,
  asset,
  amount,
  feerate_limit,
  balance,
  onchain_address,
  instant_settlement,
  created_at,
  count
"#;

#[derive(Debug)]
pub struct SqliteSwapStore {
    conn: Mutex<Connection>,
}

impl SqliteSwapStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create swap store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("swap store mutex poisoned"))
    }

    fn query_submarine(&self, filter: &str, args: &[&str]) -> Result<Vec<SubmarineSwap>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SUBMARINE_COLUMNS} FROM submarine_swaps {filter}"
            ))
            .context("prepare submarine swap query")?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), submarine_from_row)
            .context("query submarine swaps")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read submarine swap row")?);
        }
        Ok(out)
    }

    fn query_reverse(&self, filter: &str, args: &[&str]) -> Result<Vec<ReverseSubmarineSwap>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {REVERSE_COLUMNS} FROM reverse_swaps {filter}"
            ))
            .context("prepare reverse swap query")?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), reverse_from_row)
            .context("query reverse swaps")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read reverse swap row")?);
        }
        Ok(out)
    }

    fn query_auto(&self, filter: &str, args: &[&str]) -> Result<Vec<AutoReverseSubmarineSwap>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {AUTO_COLUMNS} FROM auto_reverse_swaps {filter}"
            ))
            .context("prepare auto swap query")?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), auto_from_row)
            .context("query auto swaps")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read auto swap row")?);
        }
        Ok(out)
    }
}

impl SwapStore for SqliteSwapStore {
    fn insert_submarine_swap(&self, swap: &SubmarineSwap) -> Result<()> {
        self.conn()?
            .execute(
                &format!(
                    "INSERT INTO submarine_swaps ({SUBMARINE_COLUMNS}) VALUES (
  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19
)"
                ),
                params![
                    &swap.id,
                    &swap.wallet,
                    swap.asset.as_str(),
                    swap.amount,
                    swap.direction.as_str(),
                    swap.feerate,
                    swap.feerate_value,
                    &swap.payment_hash,
                    swap.created_at,
                    swap.status.as_str(),
                    &swap.refund_privkey,
                    &swap.refund_address,
                    &swap.boltz_id,
                    swap.expected_amount,
                    swap.timeout_block_height,
                    &swap.address,
                    &swap.bip21,
                    &swap.redeem_script,
                    &swap.blinding_key,
                ],
            )
            .with_context(|| format!("insert submarine swap {}", swap.id))?;
        Ok(())
    }

    fn get_submarine_swap(&self, id: &str) -> Result<Option<SubmarineSwap>> {
        self.conn()?
            .query_row(
                &format!("SELECT {SUBMARINE_COLUMNS} FROM submarine_swaps WHERE id = ?1"),
                params![id],
                submarine_from_row,
            )
            .optional()
            .with_context(|| format!("get submarine swap {id}"))
    }

    fn get_submarine_swap_by_payment_hash(
        &self,
        payment_hash: &str,
    ) -> Result<Option<SubmarineSwap>> {
        Ok(self
            .query_submarine("WHERE payment_hash = ?1 LIMIT 1", &[payment_hash])
            .with_context(|| format!("get submarine swap by payment hash {payment_hash}"))?
            .into_iter()
            .next())
    }

    fn list_submarine_swaps(&self, wallets: &[String]) -> Result<Vec<SubmarineSwap>> {
        if wallets.is_empty() {
            return Ok(Vec::new());
        }
        let args: Vec<&str> = wallets.iter().map(String::as_str).collect();
        self.query_submarine(
            &format!(
                "WHERE wallet IN ({}) ORDER BY created_at DESC, id",
                placeholders(args.len())
            ),
            &args,
        )
    }

    fn list_pending_submarine_swaps(&self) -> Result<Vec<SubmarineSwap>> {
        self.query_submarine(
            "WHERE status = ?1 ORDER BY created_at DESC, id",
            &[SwapStatus::Pending.as_str()],
        )
    }

    fn insert_reverse_swap(&self, swap: &ReverseSubmarineSwap) -> Result<()> {
        self.conn()?
            .execute(
                &format!(
                    "INSERT INTO reverse_swaps ({REVERSE_COLUMNS}) VALUES (
  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20
)"
                ),
                params![
                    &swap.id,
                    &swap.wallet,
                    swap.asset.as_str(),
                    swap.amount,
                    swap.direction.as_str(),
                    swap.feerate,
                    swap.feerate_value,
                    &swap.onchain_address,
                    swap.instant_settlement,
                    swap.created_at,
                    swap.status.as_str(),
                    &swap.boltz_id,
                    &swap.preimage,
                    &swap.claim_privkey,
                    &swap.lockup_address,
                    &swap.invoice,
                    swap.onchain_amount,
                    swap.timeout_block_height,
                    &swap.redeem_script,
                    &swap.blinding_key,
                ],
            )
            .with_context(|| format!("insert reverse swap {}", swap.id))?;
        Ok(())
    }

    fn get_reverse_swap(&self, id: &str) -> Result<Option<ReverseSubmarineSwap>> {
        self.conn()?
            .query_row(
                &format!("SELECT {REVERSE_COLUMNS} FROM reverse_swaps WHERE id = ?1"),
                params![id],
                reverse_from_row,
            )
            .optional()
            .with_context(|| format!("get reverse swap {id}"))
    }

    fn list_reverse_swaps(&self, wallets: &[String]) -> Result<Vec<ReverseSubmarineSwap>> {
        if wallets.is_empty() {
            return Ok(Vec::new());
        }
        let args: Vec<&str> = wallets.iter().map(String::as_str).collect();
        self.query_reverse(
            &format!(
                "WHERE wallet IN ({}) ORDER BY created_at DESC, id",
                placeholders(args.len())
            ),
            &args,
        )
    }

    fn list_pending_reverse_swaps(&self) -> Result<Vec<ReverseSubmarineSwap>> {
        self.query_reverse(
            "WHERE status = ?1 ORDER BY created_at DESC, id",
            &[SwapStatus::Pending.as_str()],
        )
    }

    fn insert_auto_swap(&self, swap: &AutoReverseSubmarineSwap) -> Result<()> {
        self.conn()?
            .execute(
                &format!(
                    "INSERT INTO auto_reverse_swaps ({AUTO_COLUMNS}) VALUES (
  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
)"
                ),
                params![
                    &swap.id,
                    &swap.wallet,
                    swap.asset.as_str(),
                    swap.amount,
                    swap.feerate_limit,
                    swap.balance,
                    &swap.onchain_address,
                    swap.instant_settlement,
                    swap.created_at,
                    swap.count,
                ],
            )
            .with_context(|| format!("insert auto swap {}", swap.id))?;
        Ok(())
    }

    fn get_auto_swap(&self, id: &str) -> Result<Option<AutoReverseSubmarineSwap>> {
        self.conn()?
            .query_row(
                &format!("SELECT {AUTO_COLUMNS} FROM auto_reverse_swaps WHERE id = ?1"),
                params![id],
                auto_from_row,
            )
            .optional()
            .with_context(|| format!("get auto swap {id}"))
    }

    fn get_auto_swap_by_wallet(&self, wallet: &str) -> Result<Option<AutoReverseSubmarineSwap>> {
        Ok(self
            .query_auto("WHERE wallet = ?1 ORDER BY created_at, id LIMIT 1", &[wallet])
            .with_context(|| format!("get auto swap for wallet {wallet}"))?
            .into_iter()
            .next())
    }

    fn list_auto_swaps(&self, wallets: &[String]) -> Result<Vec<AutoReverseSubmarineSwap>> {
        if wallets.is_empty() {
            return Ok(Vec::new());
        }
        let args: Vec<&str> = wallets.iter().map(String::as_str).collect();
        self.query_auto(
            &format!(
                "WHERE wallet IN ({}) ORDER BY created_at DESC, id",
                placeholders(args.len())
            ),
            &args,
        )
    }

    fn update_auto_swap_count(&self, id: &str, count: u64) -> Result<()> {
        let rows = self
            .conn()?
            .execute(
                "UPDATE auto_reverse_swaps SET count = ?2 WHERE id = ?1",
                params![id, count],
            )
            .with_context(|| format!("update auto swap count {id}"))?;
        anyhow::ensure!(rows == 1, "auto swap not found: {id}");
        Ok(())
    }

    fn delete_auto_swap(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()?
            .execute("DELETE FROM auto_reverse_swaps WHERE id = ?1", params![id])
            .with_context(|| format!("delete auto swap {id}"))?;
        Ok(rows > 0)
    }

    fn update_swap_status(&self, id: &str, status: SwapStatus) -> Result<bool> {
        anyhow::ensure!(
            SwapStatus::Pending.can_transition_to(status),
            "refusing to move swap {id} back to {status}"
        );

        let conn = self.conn()?;
        for table in ["submarine_swaps", "reverse_swaps"] {
            let rows = conn
                .execute(
                    &format!("UPDATE {table} SET status = ?2 WHERE id = ?1 AND status = ?3"),
                    params![id, status.as_str(), SwapStatus::Pending.as_str()],
                )
                .with_context(|| format!("update swap status {id}"))?;
            if rows == 1 {
                return Ok(true);
            }

            let exists: Option<String> = conn
                .query_row(
                    &format!("SELECT status FROM {table} WHERE id = ?1"),
                    params![id],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("read swap status {id}"))?;
            if exists.is_some() {
                return Ok(false);
            }
        }

        anyhow::bail!("swap not found: {id}")
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS submarine_swaps (
  id TEXT PRIMARY KEY,
  wallet TEXT NOT NULL,
  asset TEXT NOT NULL,
  amount INTEGER NOT NULL,
  direction TEXT NOT NULL,
  feerate BOOLEAN NOT NULL DEFAULT 0,
  feerate_value INTEGER,
  payment_hash TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  status TEXT NOT NULL,
  refund_privkey TEXT NOT NULL,
  refund_address TEXT NOT NULL,
  boltz_id TEXT NOT NULL,
  expected_amount INTEGER NOT NULL,
  timeout_block_height INTEGER NOT NULL,
  address TEXT NOT NULL,
  bip21 TEXT NOT NULL,
  redeem_script TEXT NOT NULL,
  blinding_key TEXT
);
CREATE INDEX IF NOT EXISTS submarine_swaps_status_idx ON submarine_swaps(status);
CREATE INDEX IF NOT EXISTS submarine_swaps_wallet_idx ON submarine_swaps(wallet);
CREATE INDEX IF NOT EXISTS submarine_swaps_payment_hash_idx ON submarine_swaps(payment_hash);

CREATE TABLE IF NOT EXISTS reverse_swaps (
  id TEXT PRIMARY KEY,
  wallet TEXT NOT NULL,
  asset TEXT NOT NULL,
  amount INTEGER NOT NULL,
  direction TEXT NOT NULL,
  feerate BOOLEAN NOT NULL DEFAULT 0,
  feerate_value INTEGER,
  onchain_address TEXT NOT NULL,
  instant_settlement BOOLEAN NOT NULL,
  created_at INTEGER NOT NULL,
  status TEXT NOT NULL,
  boltz_id TEXT NOT NULL,
  preimage TEXT NOT NULL,
  claim_privkey TEXT NOT NULL,
  lockup_address TEXT NOT NULL,
  invoice TEXT NOT NULL,
  onchain_amount INTEGER NOT NULL,
  timeout_block_height INTEGER NOT NULL,
  redeem_script TEXT NOT NULL,
  blinding_key TEXT
);
CREATE INDEX IF NOT EXISTS reverse_swaps_status_idx ON reverse_swaps(status);
CREATE INDEX IF NOT EXISTS reverse_swaps_wallet_idx ON reverse_swaps(wallet);

CREATE TABLE IF NOT EXISTS auto_reverse_swaps (
  id TEXT PRIMARY KEY,
  wallet TEXT NOT NULL,
  asset TEXT NOT NULL,
  amount INTEGER NOT NULL,
  feerate_limit INTEGER,
  balance INTEGER NOT NULL,
  onchain_address TEXT NOT NULL,
  instant_settlement BOOLEAN NOT NULL,
  created_at INTEGER NOT NULL,
  count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS auto_reverse_swaps_wallet_idx ON auto_reverse_swaps(wallet);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn submarine_from_row(row: &Row<'_>) -> rusqlite::Result<SubmarineSwap> {
    Ok(SubmarineSwap {
        id: row.get(0)?,
        wallet: row.get(1)?,
        asset: parse_col(row, 2)?,
        amount: u64_col(row, 3)?,
        direction: parse_col(row, 4)?,
        feerate: row.get(5)?,
        feerate_value: opt_u64_col(row, 6)?,
        payment_hash: row.get(7)?,
        created_at: u64_col(row, 8)?,
        status: parse_col(row, 9)?,
        refund_privkey: row.get(10)?,
        refund_address: row.get(11)?,
        boltz_id: row.get(12)?,
        expected_amount: u64_col(row, 13)?,
        timeout_block_height: u32_col(row, 14)?,
        address: row.get(15)?,
        bip21: row.get(16)?,
        redeem_script: row.get(17)?,
        blinding_key: row.get(18)?,
    })
}

fn reverse_from_row(row: &Row<'_>) -> rusqlite::Result<ReverseSubmarineSwap> {
    Ok(ReverseSubmarineSwap {
        id: row.get(0)?,
        wallet: row.get(1)?,
        asset: parse_col(row, 2)?,
        amount: u64_col(row, 3)?,
        direction: parse_col(row, 4)?,
        feerate: row.get(5)?,
        feerate_value: opt_u64_col(row, 6)?,
        onchain_address: row.get(7)?,
        instant_settlement: row.get(8)?,
        created_at: u64_col(row, 9)?,
        status: parse_col(row, 10)?,
        boltz_id: row.get(11)?,
        preimage: row.get(12)?,
        claim_privkey: row.get(13)?,
        lockup_address: row.get(14)?,
        invoice: row.get(15)?,
        onchain_amount: u64_col(row, 16)?,
        timeout_block_height: u32_col(row, 17)?,
        redeem_script: row.get(18)?,
        blinding_key: row.get(19)?,
    })
}

fn auto_from_row(row: &Row<'_>) -> rusqlite::Result<AutoReverseSubmarineSwap> {
    Ok(AutoReverseSubmarineSwap {
        id: row.get(0)?,
        wallet: row.get(1)?,
        asset: parse_col(row, 2)?,
        amount: u64_col(row, 3)?,
        feerate_limit: opt_u64_col(row, 4)?,
        balance: u64_col(row, 5)?,
        onchain_address: row.get(6)?,
        instant_settlement: row.get(7)?,
        created_at: u64_col(row, 8)?,
        count: u64_col(row, 9)?,
    })
}

fn u64_col(row: &Row<'_>, col: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(col)?;
    u64::try_from(value).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            Type::Integer,
            format!("invalid unsigned value {value}").into(),
        )
    })
}

fn opt_u64_col(row: &Row<'_>, col: usize) -> rusqlite::Result<Option<u64>> {
    let value: Option<i64> = row.get(col)?;
    value
        .map(|v| {
            u64::try_from(v).map_err(|_| {
                rusqlite::Error::FromSqlConversionFailure(
                    col,
                    Type::Integer,
                    format!("invalid unsigned value {v}").into(),
                )
            })
        })
        .transpose()
}

fn u32_col(row: &Row<'_>, col: usize) -> rusqlite::Result<u32> {
    let value: i64 = row.get(col)?;
    u32::try_from(value).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            Type::Integer,
            format!("invalid u32 value {value}").into(),
        )
    })
}

fn parse_col<T>(row: &Row<'_>, col: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.get(col)?;
    raw.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(col, Type::Text, e.to_string().into())
    })
}
