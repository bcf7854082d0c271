//! 访问控制校验 - 业务能力层
//!
//! 按 fail-closed 规则把边界反馈归为 Allowed / Denied / Ambiguous

use tracing::{info, warn};

use crate::boundary::QaBoundary;
use crate::config::Config;
use crate::error::{HarnessError, HarnessResult};
use crate::models::{AccessDecision, AccessEvidence, AccessOutcome, Actor, ProtectedResource};

/// 把边界反馈归类
///
/// - API：2xx 为 Allowed；403 或重定向到拒绝路由为 Denied
/// - API 401：只有请求本来就没带令牌时才算 Denied；带了令牌的 401 说明令牌被拒，
///   证明不了角色限制生效，归为 Ambiguous
/// - UI：停在拒绝路由为 Denied；停在目标路由且标记元素存在为 Allowed
///
/// 其余一律 Ambiguous，不会因为"没看到拒绝"就判为 Allowed
pub fn classify(evidence: &AccessEvidence, denial_route: &str, authenticated: bool) -> AccessOutcome {
    match evidence {
        AccessEvidence::Http {
            status, location, ..
        } => match status {
            200..=299 => AccessOutcome::Allowed,
            403 => AccessOutcome::Denied,
            401 if !authenticated => AccessOutcome::Denied,
            300..=399 => match location {
                Some(loc) if points_to(loc, denial_route) => AccessOutcome::Denied,
                _ => AccessOutcome::Ambiguous,
            },
            _ => AccessOutcome::Ambiguous,
        },
        AccessEvidence::Page {
            requested_route,
            final_path,
            marker_present,
        } => {
            if final_path == denial_route {
                AccessOutcome::Denied
            } else if final_path == requested_route && *marker_present {
                AccessOutcome::Allowed
            } else {
                AccessOutcome::Ambiguous
            }
        }
    }
}

/// `location` 是否指向 `route`（可以是绝对 URL，可以带查询参数）
fn points_to(location: &str, route: &str) -> bool {
    let without_query = location.split(['?', '#']).next().unwrap_or(location);
    let path = match without_query.find("://") {
        Some(scheme_end) => {
            let rest = &without_query[scheme_end + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
        }
        None => without_query,
    };
    path == route
}

/// 访问控制校验器
pub struct AccessVerifier {
    denial_route: String,
}

impl AccessVerifier {
    pub fn new(config: &Config) -> Self {
        Self {
            denial_route: config.routes.denial.clone(),
        }
    }

    /// 以 actor 身份请求资源并给出判定
    ///
    /// Ambiguous 也作为正常结果返回，由调用方决定失败方式；
    /// 需要直接失败时使用 [`AccessVerifier::require_conclusive`]
    pub async fn check_access<B>(
        &self,
        boundary: &B,
        actor: &Actor,
        resource: &ProtectedResource,
    ) -> HarnessResult<AccessDecision>
    where
        B: QaBoundary + ?Sized,
    {
        info!("🛡️ {} 请求资源 {}", actor, resource.name);
        let evidence = boundary.request_resource(actor, resource).await?;
        let outcome = classify(&evidence, &self.denial_route, actor.is_authenticated());

        let decision = AccessDecision {
            role: actor.role(),
            resource: resource.name.clone(),
            outcome,
            evidence,
        };
        match outcome {
            AccessOutcome::Ambiguous => warn!("⚠️ {}", decision),
            _ => info!("✓ {}", decision),
        }
        Ok(decision)
    }

    /// Ambiguous 转为 `AmbiguousAccess` 错误
    pub fn require_conclusive(decision: AccessDecision) -> HarnessResult<AccessDecision> {
        match decision.outcome {
            AccessOutcome::Ambiguous => Err(HarnessError::AmbiguousAccess(decision)),
            _ => Ok(decision),
        }
    }
}
