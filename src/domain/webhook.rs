//! Push webhook payload

use serde::Deserialize;

/// 推送事件，只关心 `ref`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
}

impl PushEvent {
    /// 是否推送到指定 ref
    pub fn targets(&self, tracked_ref: &str) -> bool {
        self.git_ref.as_deref() == Some(tracked_ref)
    }
}
