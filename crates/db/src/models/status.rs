//! Job status enum mapping to the SMALLINT `job_statuses` lookup table.
//!
//! Variant discriminants match the seed rows written by
//! [`schema::install`](crate::schema::install).

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Job lifecycle status.
///
/// `queued -> locked -> processing -> {successful | failed}`. The last two are
/// terminal; nothing in the queue moves a job out of them.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued = 1,
    Locked = 2,
    Processing = 3,
    Successful = 4,
    Failed = 5,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Locked,
        JobStatus::Processing,
        JobStatus::Successful,
        JobStatus::Failed,
    ];

    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Name stored in `job_statuses.name`.
    pub fn name(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Locked => "locked",
            JobStatus::Processing => "processing",
            JobStatus::Successful => "successful",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_id(id: StatusId) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.id() == id)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Successful | JobStatus::Failed)
    }
}

impl From<JobStatus> for StatusId {
    fn from(value: JobStatus) -> Self {
        value as StatusId
    }
}
