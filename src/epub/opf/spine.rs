//! 脊柱模块
//!
//! 提供EPUB包中阅读顺序（脊柱）的结构定义。

/// 脊柱项信息(阅读顺序)
#[derive(Debug, Clone, PartialEq)]
pub struct SpineItem {
    /// 引用的清单项ID
    pub idref: String,
    /// 是否线性阅读
    pub linear: bool,
    pub id: Option<String>,
    /// 属性(如page-spread-left)
    pub properties: Option<String>,
}

impl SpineItem {
    /// 创建新的脊柱项
    pub fn new(idref: String) -> Self {
        Self::with_linear(idref, true)
    }

    /// 创建指定线性属性的脊柱项
    pub fn with_linear(idref: String, linear: bool) -> Self {
        Self {
            idref,
            linear,
            id: None,
            properties: None,
        }
    }

    /// 检查是否为线性阅读
    pub fn is_linear(&self) -> bool {
        self.linear
    }
}

/// `<spine>` 元素
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spine {
    pub id: Option<String>,
    /// EPUB2的NCX引用
    pub toc: Option<String>,
    pub page_progression_direction: Option<String>,
    pub itemrefs: Vec<SpineItem>,
}

/// EPUB2 `<guide>` 中的引用
#[derive(Debug, Clone, PartialEq)]
pub struct GuideReference {
    pub kind: String,
    pub title: Option<String>,
    pub href: String,
}
