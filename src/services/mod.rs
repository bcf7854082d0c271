//! 业务能力层
//!
//! 每个服务描述"我能做什么"，只依赖边界契约 [`crate::boundary::QaBoundary`]，
//! 不关心场景的先后顺序

pub mod access;
pub mod gateway;
pub mod observation;
pub mod session;

pub use access::{classify, AccessVerifier};
pub use gateway::JobGateway;
pub use observation::{ObservationEngine, ObservationMachine, ObservationOutcome, PollPolicy, Step};
pub use session::SessionManager;
