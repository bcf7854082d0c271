//! 访问控制模型

use std::fmt;

use serde::Serialize;

use crate::models::actor::Role;
use crate::selectors::Element;

/// 访问受保护资源时发出的请求形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRequest {
    Get,
    /// 以 multipart 上传一个文件
    Upload {
        file_name: String,
        mime: String,
        content: String,
    },
}

/// 受角色限制的资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedResource {
    pub name: String,
    /// API 路径（相对 `api_base_url`）
    pub api_path: String,
    pub request: ResourceRequest,
    /// UI 路由（相对 `ui_base_url`）
    pub ui_route: String,
    /// UI 中证明"已到达该页面"的元素
    pub marker: Element,
    pub required_role: Role,
}

/// 消息是否在说文件格式问题（提到 CSV 或 format）
pub fn names_format_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("csv") || lower.contains("format")
}

pub const SAMPLE_COMPANIES_CSV: &str = "companyName,isin,sector\nNokia Corporation,FI0009000681,Technology\nApple Inc,US0378331005,Technology";

impl ProtectedResource {
    /// 管理员公司数据上传入口
    pub fn admin_upload(ui_route: impl Into<String>) -> Self {
        Self {
            name: "admin-companies-upload".to_string(),
            api_path: "/api/v1/admin/companies/upload".to_string(),
            request: ResourceRequest::Upload {
                file_name: "companies.csv".to_string(),
                mime: "text/csv".to_string(),
                content: SAMPLE_COMPANIES_CSV.to_string(),
            },
            ui_route: ui_route.into(),
            marker: Element::UploadForm,
            required_role: Role::Admin,
        }
    }
}

/// 访问判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessOutcome {
    Allowed,
    Denied,
    /// 既不是明确成功也不是明确拒绝，必须判为测试失败
    Ambiguous,
}

/// 边界对资源请求的原始反馈
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AccessEvidence {
    Http {
        status: u16,
        location: Option<String>,
        body_excerpt: String,
    },
    Page {
        requested_route: String,
        final_path: String,
        marker_present: bool,
    },
}

impl fmt::Display for AccessEvidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http {
                status,
                location,
                body_excerpt,
            } => {
                write!(f, "HTTP {}", status)?;
                if let Some(loc) = location {
                    write!(f, " -> {}", loc)?;
                }
                if !body_excerpt.is_empty() {
                    write!(f, " {}", body_excerpt)?;
                }
                Ok(())
            }
            Self::Page {
                requested_route,
                final_path,
                marker_present,
            } => write!(
                f,
                "页面 {} -> {} (标记元素: {})",
                requested_route,
                final_path,
                if *marker_present { "存在" } else { "缺失" }
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub role: Role,
    pub resource: String,
    pub outcome: AccessOutcome,
    pub evidence: AccessEvidence,
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 访问 {} => {:?} ({})",
            self.role, self.resource, self.outcome, self.evidence
        )
    }
}

/// 管理员上传的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Accepted {
        processed_rows: u64,
        errors: Vec<String>,
    },
    UnsupportedMediaType {
        message: String,
    },
    Forbidden {
        status: u16,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_format_rejection() {
        assert!(names_format_rejection("Only CSV files are allowed"));
        assert!(names_format_rejection("Invalid file format"));
        assert!(names_format_rejection("unsupported csv"));
        assert!(!names_format_rejection("Internal server error"));
        assert!(!names_format_rejection(""));
    }
}
