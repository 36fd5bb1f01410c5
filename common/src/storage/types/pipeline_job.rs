use uuid::Uuid;

use crate::{
    error::{AppError, StageError},
    storage::db::SurrealDbClient,
    stored_object,
};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataTier {
    #[default]
    Compact,
    Full,
}

stored_object!(PipelineJob, "pipeline_job", {
    resource_key: String,
    content_id: String,
    status: JobStatus,
    pipeline_version: String,
    #[serde(default)]
    data_tier: DataTier,
    #[serde(default)]
    idempotency_key: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    error_stage: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
    // Mirrors resource_key while the job is pending/processing; terminal
    // transitions park it on the job id so the unique index only ever
    // guards active jobs.
    #[serde(default)]
    active_key: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    started_at: Option<DateTime<Utc>>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    finished_at: Option<DateTime<Utc>>
});

impl PipelineJob {
    pub fn new(
        resource_key: String,
        content_id: String,
        pipeline_version: String,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        Self {
            id,
            created_at: now,
            updated_at: now,
            active_key: Some(resource_key.clone()),
            resource_key,
            content_id,
            status: JobStatus::Pending,
            pipeline_version,
            data_tier: DataTier::Compact,
            idempotency_key: None,
            error_code: None,
            error_message: None,
            error_stage: None,
            metadata,
            started_at: None,
            finished_at: None,
        }
    }

    pub async fn find_active_by_resource_key(
        resource_key: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM pipeline_job
                 WHERE resource_key = $resource_key
                   AND status IN ['pending', 'processing']
                 LIMIT 1",
            )
            .bind(("resource_key", resource_key.to_owned()))
            .await?;
        Ok(response.take::<Vec<Self>>(0)?.into_iter().next())
    }

    /// Claim the oldest pending job: the conditional update loses the race
    /// cleanly when another worker got there first.
    pub async fn claim_next_pending(db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM pipeline_job WHERE status = 'pending'
                 ORDER BY created_at ASC LIMIT 1",
            )
            .await?;
        let Some(candidate) = response.take::<Vec<Self>>(0)?.into_iter().next() else {
            return Ok(None);
        };

        let mut claimed = db
            .query(
                "UPDATE type::thing('pipeline_job', $id)
                 SET status = 'processing',
                     started_at = time::now(),
                     updated_at = time::now()
                 WHERE status = 'pending'
                 RETURN AFTER",
            )
            .bind(("id", candidate.id))
            .await?;
        Ok(claimed.take::<Vec<Self>>(0)?.into_iter().next())
    }

    pub async fn mark_completed(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing('pipeline_job', $id)
             SET status = 'completed',
                 finished_at = time::now(),
                 updated_at = time::now(),
                 active_key = string::concat('done:', $id)",
        )
        .bind(("id", id.to_owned()))
        .await?;
        Ok(())
    }

    pub async fn mark_failed(
        id: &str,
        error: &StageError,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing('pipeline_job', $id)
             SET status = 'failed',
                 error_stage = $stage,
                 error_code = $code,
                 error_message = $message,
                 finished_at = time::now(),
                 updated_at = time::now(),
                 active_key = string::concat('done:', $id)",
        )
        .bind(("id", id.to_owned()))
        .bind(("stage", error.stage))
        .bind(("code", error.code))
        .bind(("message", error.message.clone()))
        .await?;
        Ok(())
    }

    /// Request cancellation. Terminal jobs are left untouched and returned
    /// as-is; an in-flight stage finishes before the flag is observed.
    pub async fn cancel(id: &str, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let Some(job) = db.get_item::<Self>(id).await? else {
            return Ok(None);
        };
        if job.status.is_terminal() {
            return Ok(Some(job));
        }

        db.query(
            "UPDATE type::thing('pipeline_job', $id)
             SET status = 'cancelled',
                 finished_at = time::now(),
                 updated_at = time::now(),
                 active_key = string::concat('done:', $id)",
        )
        .bind(("id", id.to_owned()))
        .await?;
        Ok(db.get_item::<Self>(id).await?)
    }

    pub async fn is_cancelled(id: &str, db: &SurrealDbClient) -> Result<bool, AppError> {
        let job = db.get_item::<Self>(id).await?;
        Ok(job.is_some_and(|j| j.status == JobStatus::Cancelled))
    }

    pub async fn list(
        status: Option<JobStatus>,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let mut sql = "SELECT * FROM pipeline_job".to_owned();
        if status.is_some() {
            sql.push_str(" WHERE status = $status");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT $limit");

        let mut query = db.query(sql).bind(("limit", limit.max(1)));
        if let Some(status) = status {
            query = query.bind(("status", status));
        }
        Ok(query.await?.take(0)?)
    }
}
