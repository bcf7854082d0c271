pub mod access;
pub mod actor;
pub mod job;
pub mod submission;

pub use access::{
    AccessDecision, AccessEvidence, AccessOutcome, ProtectedResource, ResourceRequest, UploadOutcome,
};
pub use actor::{
    Actor, AuthFailure, AuthFailureReason, CapabilityToken, Credential, LoginProfile, Role,
};
pub use job::{JobHandle, JobId, JobResult, JobState, Observation, StatusSnapshot};
pub use submission::{QuestionPayload, Submission, ValidationOutcome};
