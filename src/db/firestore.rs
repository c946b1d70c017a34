// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations.
//!
//! Collections:
//! - `members` (profiles, owned by the hosted auth/CRM side)
//! - `attendance` (check-in/check-out records)
//! - `location_reports` (latest device fix per member)

use crate::db::{collections, Store};
use crate::error::AppError;
use crate::models::{AttendanceRecord, AttendanceStatus, LocationReport, Member};
use chrono::{DateTime, Utc};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

#[async_trait::async_trait]
impl Store for FirestoreDb {
    async fn get_member(&self, member_id: &str) -> Result<Option<Member>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::MEMBERS)
            .obj()
            .one(member_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_open_session(
        &self,
        member_id: &str,
    ) -> Result<Option<AttendanceRecord>, AppError> {
        let member_id = member_id.to_string();
        let records: Vec<AttendanceRecord> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ATTENDANCE)
            .filter(move |q| {
                q.for_all([
                    q.field("member_id").eq(member_id.clone()),
                    q.field("status").eq(AttendanceStatus::Inside.as_str()),
                ])
            })
            .order_by([(
                "entry_time",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(records.into_iter().next())
    }

    async fn insert_session(&self, record: &AttendanceRecord) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ATTENDANCE)
            .document_id(&record.id)
            .object(record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn close_session(
        &self,
        record_id: &str,
        exit_time: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AppError> {
        // Fetch-modify-write; the update by document ID is atomic.
        let mut record: AttendanceRecord = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ATTENDANCE)
            .obj()
            .one(record_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("Attendance record {}", record_id)))?;

        record.close(exit_time);

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ATTENDANCE)
            .document_id(record_id)
            .object(&record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(record)
    }

    async fn list_open_sessions(&self) -> Result<Vec<AttendanceRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ATTENDANCE)
            .filter(|q| q.field("status").eq(AttendanceStatus::Inside.as_str()))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn count_open_sessions(&self) -> Result<usize, AppError> {
        // A single gym keeps this list small; a full count aggregate
        // is not worth the extra query surface.
        Ok(self.list_open_sessions().await?.len())
    }

    async fn list_member_sessions(
        &self,
        member_id: &str,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        let member_id = member_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ATTENDANCE)
            .filter(move |q| q.field("member_id").eq(member_id.clone()))
            .order_by([(
                "entry_time",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn latest_location(
        &self,
        member_id: &str,
    ) -> Result<Option<LocationReport>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::LOCATION_REPORTS)
            .obj()
            .one(member_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn record_location(&self, report: &LocationReport) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::LOCATION_REPORTS)
            .document_id(&report.member_id)
            .object(report)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
