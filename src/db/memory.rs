// SPDX-License-Identifier: MIT

//! In-memory `Store` for tests and offline development.
//!
//! Mirrors the Firestore semantics (point queries, row-level updates)
//! and adds failure-injection switches so persistence-failure and
//! sweep-isolation behavior can be exercised without an emulator.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{AttendanceRecord, AttendanceStatus, LocationReport, Member};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    members: HashMap<String, Member>,
    sessions: HashMap<String, AttendanceRecord>,
    reports: HashMap<String, LocationReport>,
    /// Record IDs whose close_session calls should fail
    fail_close_ids: HashSet<String>,
}

/// In-memory store with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_member(&self, member: Member) {
        self.inner
            .write()
            .expect("memory store lock poisoned")
            .members
            .insert(member.id.clone(), member);
    }

    /// Seed a record directly, bypassing the engine.
    pub fn put_session(&self, record: AttendanceRecord) {
        self.inner
            .write()
            .expect("memory store lock poisoned")
            .sessions
            .insert(record.id.clone(), record);
    }

    pub fn get_session(&self, record_id: &str) -> Option<AttendanceRecord> {
        self.inner
            .read()
            .expect("memory store lock poisoned")
            .sessions
            .get(record_id)
            .cloned()
    }

    pub fn session_count(&self) -> usize {
        self.inner
            .read()
            .expect("memory store lock poisoned")
            .sessions
            .len()
    }

    /// Make every read operation fail (store unreachable).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write operation fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `close_session` fail for one specific record.
    pub fn fail_close_for(&self, record_id: &str) {
        self.inner
            .write()
            .expect("memory store lock poisoned")
            .fail_close_ids
            .insert(record_id.to_string());
    }

    fn check_read(&self) -> Result<(), AppError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Database("memory store: reads disabled".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("memory store: writes disabled".to_string()));
        }
        Ok(())
    }

    // Store operations propagate a poisoned lock as a database error
    // instead of panicking; the store also serves offline development,
    // not just tests.
    fn read_inner(&self) -> Result<RwLockReadGuard<'_, Inner>, AppError> {
        self.inner
            .read()
            .map_err(|_| AppError::Database("memory store: lock poisoned".to_string()))
    }

    fn write_inner(&self) -> Result<RwLockWriteGuard<'_, Inner>, AppError> {
        self.inner
            .write()
            .map_err(|_| AppError::Database("memory store: lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get_member(&self, member_id: &str) -> Result<Option<Member>, AppError> {
        self.check_read()?;
        Ok(self.read_inner()?.members.get(member_id).cloned())
    }

    async fn find_open_session(
        &self,
        member_id: &str,
    ) -> Result<Option<AttendanceRecord>, AppError> {
        self.check_read()?;
        let inner = self.read_inner()?;
        Ok(inner
            .sessions
            .values()
            .filter(|r| r.member_id == member_id && r.status == AttendanceStatus::Inside)
            .max_by_key(|r| r.entry_time)
            .cloned())
    }

    async fn insert_session(&self, record: &AttendanceRecord) -> Result<(), AppError> {
        self.check_write()?;
        self.write_inner()?
            .sessions
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn close_session(
        &self,
        record_id: &str,
        exit_time: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AppError> {
        self.check_write()?;
        let mut inner = self.write_inner()?;

        if inner.fail_close_ids.contains(record_id) {
            return Err(AppError::Database(format!(
                "memory store: close disabled for {}",
                record_id
            )));
        }

        let record = inner
            .sessions
            .get_mut(record_id)
            .ok_or_else(|| AppError::NotFound(format!("Attendance record {}", record_id)))?;
        record.close(exit_time);
        Ok(record.clone())
    }

    async fn list_open_sessions(&self) -> Result<Vec<AttendanceRecord>, AppError> {
        self.check_read()?;
        let inner = self.read_inner()?;
        let mut open: Vec<AttendanceRecord> = inner
            .sessions
            .values()
            .filter(|r| r.status == AttendanceStatus::Inside)
            .cloned()
            .collect();
        open.sort_by_key(|r| r.entry_time);
        Ok(open)
    }

    async fn count_open_sessions(&self) -> Result<usize, AppError> {
        Ok(self.list_open_sessions().await?.len())
    }

    async fn list_member_sessions(
        &self,
        member_id: &str,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        self.check_read()?;
        let inner = self.read_inner()?;
        let mut records: Vec<AttendanceRecord> = inner
            .sessions
            .values()
            .filter(|r| r.member_id == member_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.entry_time));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn latest_location(
        &self,
        member_id: &str,
    ) -> Result<Option<LocationReport>, AppError> {
        self.check_read()?;
        Ok(self.read_inner()?.reports.get(member_id).cloned())
    }

    async fn record_location(&self, report: &LocationReport) -> Result<(), AppError> {
        self.check_write()?;
        self.write_inner()?
            .reports
            .insert(report.member_id.clone(), report.clone());
        Ok(())
    }
}
