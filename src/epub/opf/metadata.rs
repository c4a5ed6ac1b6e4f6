//! 元数据模块
//!
//! 提供OPF包文件中 `<metadata>` 元素的结构定义。
//! 标题、作者、语言、标识符、描述五类Dublin Core元素按原顺序单独保存，
//! 其余元素原样保留，保证重新写出OPF时不丢失信息。

/// 单个Dublin Core元素（如 `<dc:title>`、`<dc:creator>`）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DcMeta {
    /// 元素ID（用于refines关联）
    pub id: Option<String>,
    /// opf:role属性（如aut、edt）
    pub role: Option<String>,
    /// opf:file-as属性（排序用名称）
    pub file_as: Option<String>,
    /// opf:scheme属性（标识符类型，如ISBN）
    pub scheme: Option<String>,
    /// xml:lang属性
    pub lang: Option<String>,
    /// 元素文本
    pub value: String,
}

impl DcMeta {
    /// 创建只有文本值的元素
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

/// `<meta>` 元素
///
/// 同时覆盖EPUB2的 `name`/`content` 形式和EPUB3的 `property` 形式。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaNode {
    pub property: Option<String>,
    pub name: Option<String>,
    pub content: Option<String>,
    /// 被精化元素的引用（保留原始的 `#id` 形式）
    pub refines: Option<String>,
    pub id: Option<String>,
    pub scheme: Option<String>,
    pub value: String,
}

impl MetaNode {
    /// 创建EPUB3形式的property元数据
    pub fn property(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
            value: value.into(),
            ..Self::default()
        }
    }
}

/// 其余元数据子元素（如 `<dc:publisher>`、`<link>`），按原样保存
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraElement {
    /// 带前缀的元素名
    pub name: String,
    /// 带前缀的属性名与属性值
    pub attributes: Vec<(String, String)>,
    pub value: String,
}

/// OPF文件中的元数据信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// metadata元素上声明的命名空间（xmlns:dc等），键为完整属性名
    pub namespaces: Vec<(String, String)>,
    pub titles: Vec<DcMeta>,
    pub creators: Vec<DcMeta>,
    pub languages: Vec<DcMeta>,
    pub identifiers: Vec<DcMeta>,
    pub descriptions: Vec<DcMeta>,
    pub extra: Vec<ExtraElement>,
    pub meta: Vec<MetaNode>,
}

/// EPUB3修改时间属性
pub const MODIFIED_PROPERTY: &str = "dcterms:modified";

impl Metadata {
    /// 创建新的元数据实例
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取标题
    pub fn title(&self) -> Option<&str> {
        first_value(&self.titles)
    }

    /// 获取语言
    pub fn language(&self) -> Option<&str> {
        first_value(&self.languages)
    }

    /// 获取第一个标识符
    pub fn identifier(&self) -> Option<&str> {
        first_value(&self.identifiers)
    }

    /// 获取描述
    pub fn description(&self) -> Option<&str> {
        first_value(&self.descriptions)
    }

    /// 获取所有非空的作者名
    pub fn creator_names(&self) -> Vec<String> {
        self.creators
            .iter()
            .filter(|c| !c.value.trim().is_empty())
            .map(|c| c.value.clone())
            .collect()
    }

    /// 按property查找meta值
    pub fn property(&self, property: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|m| m.property.as_deref() == Some(property))
            .map(|m| m.value.as_str())
    }

    /// 最后修改时间
    pub fn modified(&self) -> Option<&str> {
        self.property(MODIFIED_PROPERTY)
    }

    /// 设置（或追加）指定property的meta值
    pub fn set_property(&mut self, property: &str, value: String) {
        match self
            .meta
            .iter_mut()
            .find(|m| m.property.as_deref() == Some(property))
        {
            Some(node) => node.value = value,
            None => self.meta.push(MetaNode::property(property, value)),
        }
    }

    /// 五类可改写的Dublin Core列表，顺序固定：标题、作者、语言、标识符、描述
    pub fn core_lists_mut(&mut self) -> [&mut Vec<DcMeta>; 5] {
        [
            &mut self.titles,
            &mut self.creators,
            &mut self.languages,
            &mut self.identifiers,
            &mut self.descriptions,
        ]
    }
}

fn first_value(nodes: &[DcMeta]) -> Option<&str> {
    nodes.first().map(|n| n.value.as_str())
}
