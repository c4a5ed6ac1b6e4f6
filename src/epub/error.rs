use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EpubError>;

/// 错误类别
///
/// 调用方据此决定如何反馈：输入错误在任何写入之前就会返回，
/// 格式错误和IO错误都不会留下部分写入的输出。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 参数或输入文件不合法
    Input,
    /// EPUB结构或XML内容不合法
    Format,
    /// 文件系统或zip读写失败
    Io,
}

/// Epub相关的错误类型
#[derive(Error, Debug)]
pub enum EpubError {
    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("Zip文件错误: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("目录遍历错误: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("无效的输入: {0}")]
    InvalidInput(String),

    #[error("JSON格式错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("第{index}条规则的正则表达式无法编译 {pattern:?}: {source}")]
    InvalidRegex {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("XML解析错误: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("container.xml解析错误: {0}")]
    ContainerParseError(String),

    #[error("OPF文件解析错误: {0}")]
    OpfParseError(String),

    #[error("导航文档错误: {0}")]
    NavError(String),

    #[error("{path}: XHTML解析错误: {source}")]
    ContentParseError {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },

    #[error("配置文件错误: {0}")]
    ConfigError(String),
}

impl EpubError {
    /// 附带文件路径的IO错误
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EpubError::File {
            path: path.into(),
            source,
        }
    }

    /// 返回错误所属的类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            EpubError::Io(_) | EpubError::Zip(_) | EpubError::Walk(_) | EpubError::File { .. } => {
                ErrorKind::Io
            }
            EpubError::InvalidInput(_)
            | EpubError::Json(_)
            | EpubError::InvalidRegex { .. }
            | EpubError::ConfigError(_) => ErrorKind::Input,
            EpubError::XmlError(_)
            | EpubError::ContainerParseError(_)
            | EpubError::OpfParseError(_)
            | EpubError::NavError(_)
            | EpubError::ContentParseError { .. } => ErrorKind::Format,
        }
    }
}
