//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS"和按语义元素读写页面的能力

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};
use crate::selectors::Element;

#[derive(Debug, Deserialize)]
struct ElementRead {
    found: bool,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Location {
    path: String,
}

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() 能力
/// - 不认识 Job / Actor
/// - 不处理测试流程
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 执行 JS 代码并返回 JSON 结果
    ///
    /// 脚本必须返回非 null 的值
    pub async fn eval(&self, js_code: impl Into<String>) -> HarnessResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> HarnessResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 导航到指定 URL 并等待加载完成
    pub async fn goto(&self, url: &str) -> HarnessResult<()> {
        debug!("导航到: {}", url);
        self.page.goto(url).await?;
        Ok(())
    }

    /// 当前页面路径（不含域名和查询参数）
    pub async fn current_path(&self) -> HarnessResult<String> {
        let location: Location = self
            .eval_as("(() => ({ path: window.location.pathname }))()")
            .await?;
        Ok(location.path)
    }

    /// 读取元素文本；输入框读取其值。元素不存在返回 `None`
    pub async fn read_text(&self, element: Element) -> HarnessResult<Option<String>> {
        let selector = css_for(element)?;
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({});
                if (!el) {{
                    return {{ found: false, text: "" }};
                }}
                const isField = el.tagName === "INPUT" || el.tagName === "TEXTAREA";
                const text = isField ? el.value : (el.textContent || "");
                return {{ found: true, text: text.trim() }};
            }})()
            "#,
            serde_json::to_string(selector)?
        );

        let read: ElementRead = self.eval_as(js_code).await?;
        Ok(read.found.then_some(read.text))
    }

    pub async fn is_present(&self, element: Element) -> HarnessResult<bool> {
        Ok(self.read_text(element).await?.is_some())
    }

    /// 填写输入框（兼容受控组件：走原生 setter 并触发 input/change 事件）
    pub async fn fill(&self, element: Element, value: &str) -> HarnessResult<()> {
        let selector = css_for(element)?;
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({});
                if (!el) {{
                    return {{ found: false }};
                }}
                const proto = el.tagName === "TEXTAREA"
                    ? window.HTMLTextAreaElement.prototype
                    : window.HTMLInputElement.prototype;
                const setter = Object.getOwnPropertyDescriptor(proto, "value").set;
                setter.call(el, {});
                el.dispatchEvent(new Event("input", {{ bubbles: true }}));
                el.dispatchEvent(new Event("change", {{ bubbles: true }}));
                return {{ found: true }};
            }})()
            "#,
            serde_json::to_string(selector)?,
            serde_json::to_string(value)?
        );

        let read: ElementRead = self.eval_as(js_code).await?;
        require_found(element, read.found)
    }

    pub async fn click(&self, element: Element) -> HarnessResult<()> {
        let selector = css_for(element)?;
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({});
                if (!el) {{
                    return {{ found: false }};
                }}
                el.click();
                return {{ found: true }};
            }})()
            "#,
            serde_json::to_string(selector)?
        );

        let read: ElementRead = self.eval_as(js_code).await?;
        require_found(element, read.found)
    }

    /// 给文件输入框挂上一个内存中构造的文件
    pub async fn attach_file(
        &self,
        element: Element,
        file_name: &str,
        mime: &str,
        content: &str,
    ) -> HarnessResult<()> {
        let selector = css_for(element)?;
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({});
                if (!el) {{
                    return {{ found: false }};
                }}
                const file = new File([{}], {}, {{ type: {} }});
                const transfer = new DataTransfer();
                transfer.items.add(file);
                el.files = transfer.files;
                el.dispatchEvent(new Event("change", {{ bubbles: true }}));
                return {{ found: true }};
            }})()
            "#,
            serde_json::to_string(selector)?,
            serde_json::to_string(content)?,
            serde_json::to_string(file_name)?,
            serde_json::to_string(mime)?
        );

        let read: ElementRead = self.eval_as(js_code).await?;
        require_found(element, read.found)
    }

    /// 写入 localStorage
    pub async fn set_local_storage(&self, key: &str, value: &str) -> HarnessResult<()> {
        let js_code = format!(
            r#"
            (() => {{
                window.localStorage.setItem({}, {});
                return {{ found: true }};
            }})()
            "#,
            serde_json::to_string(key)?,
            serde_json::to_string(value)?
        );
        self.eval(js_code).await?;
        Ok(())
    }

    /// 读取 localStorage 中的值
    pub async fn local_storage(&self, key: &str) -> HarnessResult<Option<String>> {
        let js_code = format!(
            r#"
            (() => {{
                const v = window.localStorage.getItem({});
                return {{ found: v !== null, text: v || "" }};
            }})()
            "#,
            serde_json::to_string(key)?
        );
        let read: ElementRead = self.eval_as(js_code).await?;
        Ok(read.found.then_some(read.text))
    }

    /// 清空本页的登录状态
    pub async fn clear_storage(&self) -> HarnessResult<()> {
        self.eval(
            r#"
            (() => {
                window.localStorage.clear();
                window.sessionStorage.clear();
                return { found: true };
            })()
            "#,
        )
        .await?;
        Ok(())
    }

    /// 按名称读取 cookie，返回 `name=value` 形式
    pub async fn cookie(&self, names: &[&str]) -> HarnessResult<Option<String>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .find(|c| names.contains(&c.name.as_str()))
            .map(|c| format!("{}={}", c.name, c.value)))
    }
}

fn css_for(element: Element) -> HarnessResult<&'static str> {
    element.ui_selector().ok_or_else(|| {
        HarnessError::Config(format!("元素 {} 在 UI 中没有选择器", element))
    })
}

fn require_found(element: Element, found: bool) -> HarnessResult<()> {
    if found {
        Ok(())
    } else {
        // 页面结构不符合约定，属于边界协议问题
        Err(HarnessError::protocol(
            element.name(),
            format!("页面上找不到元素 {}", element),
        ))
    }
}
