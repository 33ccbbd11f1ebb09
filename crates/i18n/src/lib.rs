use std::collections::BTreeMap;

use core_types::UiLanguage;

#[derive(Debug, Clone)]
pub struct I18n {
    lang: UiLanguage,
    zh_cn: BTreeMap<&'static str, &'static str>,
    en_us: BTreeMap<&'static str, &'static str>,
}

impl Default for I18n {
    fn default() -> Self {
        Self::new(UiLanguage::default())
    }
}

impl I18n {
    pub fn new(lang: UiLanguage) -> Self {
        Self {
            lang,
            zh_cn: zh_cn_map(),
            en_us: en_us_map(),
        }
    }

    /// Looks up `key` in the active language, then the other one, then
    /// returns the key itself.
    pub fn t<'a>(&'a self, key: &'a str) -> &'a str {
        let (primary, secondary) = match self.lang {
            UiLanguage::ZhCn => (&self.zh_cn, &self.en_us),
            UiLanguage::EnUs => (&self.en_us, &self.zh_cn),
        };
        primary
            .get(key)
            .or_else(|| secondary.get(key))
            .copied()
            .unwrap_or(key)
    }
}

fn zh_cn_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("app.title", "效率仪表盘"),
        ("chat.fallback_error", "抱歉，处理您的消息时出现错误，请稍后重试。"),
        ("chat.cleared", "会话已清空"),
        ("chat.prompt", "你"),
        ("chat.assistant", "助手"),
        ("integration.connected", "已连接"),
        ("integration.disconnected", "未连接"),
        ("integration.inferred", "推断"),
        ("auth.required", "需要登录授权，请打开以下链接"),
        ("session.signed_out", "已退出登录"),
    ])
}

fn en_us_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("app.title", "Productivity Dashboard"),
        (
            "chat.fallback_error",
            "Sorry, I encountered an error processing your message. Please try again.",
        ),
        ("chat.cleared", "Conversation cleared"),
        ("chat.prompt", "You"),
        ("chat.assistant", "Assistant"),
        ("integration.connected", "connected"),
        ("integration.disconnected", "not connected"),
        ("integration.inferred", "inferred"),
        ("auth.required", "Authorization required, open this link"),
        ("session.signed_out", "Signed out"),
    ])
}
