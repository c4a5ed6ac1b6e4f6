//! 清单模块
//!
//! 提供EPUB包中文件清单的结构定义。

/// XHTML内容文档的媒体类型
pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// 清单项信息
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestItem {
    /// 项目ID
    pub id: String,
    /// 文件路径(相对于OPF文件)
    pub href: String,
    /// 媒体类型
    pub media_type: String,
    /// 属性(如nav、cover-image等)
    pub properties: Option<String>,
    /// 回退项ID
    pub fallback: Option<String>,
    /// 媒体覆盖层ID
    pub media_overlay: Option<String>,
}

impl ManifestItem {
    /// 创建新的清单项
    pub fn new(id: String, href: String, media_type: String) -> Self {
        Self {
            id,
            href,
            media_type,
            properties: None,
            fallback: None,
            media_overlay: None,
        }
    }

    /// 创建带属性的清单项
    pub fn with_properties(id: String, href: String, media_type: String, properties: String) -> Self {
        Self {
            properties: Some(properties),
            ..Self::new(id, href, media_type)
        }
    }

    /// 检查是否包含指定属性
    pub fn has_property(&self, property: &str) -> bool {
        if let Some(properties) = &self.properties {
            properties.split_whitespace().any(|p| p == property)
        } else {
            false
        }
    }

    /// 移除指定属性，属性列表为空时整体删除
    pub fn remove_property(&mut self, property: &str) {
        if let Some(properties) = &self.properties {
            let rest: Vec<&str> = properties
                .split_whitespace()
                .filter(|p| *p != property)
                .collect();
            self.properties = if rest.is_empty() {
                None
            } else {
                Some(rest.join(" "))
            };
        }
    }

    /// 检查是否为导航文档
    pub fn is_nav(&self) -> bool {
        self.has_property("nav")
    }

    /// 检查是否为XHTML文件
    pub fn is_xhtml(&self) -> bool {
        self.media_type == XHTML_MEDIA_TYPE
    }
}
