//! 配置模块
//!
//! 提供工具运行参数的配置管理功能，支持从YAML文件加载配置。

use crate::epub::error::{EpubError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "novfmt.yaml";

/// 工具运行参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// deflate压缩级别，为空时使用zip库的默认级别
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<i64>,
    /// 合并后导航文档的标题
    pub nav_title: String,
    /// 修改后是否更新dcterms:modified
    pub touch_modified: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            compression_level: None,
            nav_title: "Contents".to_string(),
            touch_modified: true,
        }
    }
}

impl Settings {
    /// 从指定的YAML文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    /// * `Result<Self>` - 加载成功返回配置实例，失败返回错误
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EpubError::ConfigError(format!("无法读取配置文件 {}: {}", path.display(), e))
        })?;

        let settings: Settings = serde_yml::from_str(&content)
            .map_err(|e| EpubError::ConfigError(format!("配置文件格式错误: {}", e)))?;
        settings.check()?;
        Ok(settings)
    }

    /// 加载配置
    ///
    /// 指定了路径时必须能读取；否则尝试当前目录下的 `novfmt.yaml`，
    /// 文件不存在时使用默认配置。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).is_file() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    /// 把默认配置写入指定文件
    ///
    /// # 示例
    ///
    /// ```rust,no_run
    /// use novfmt::Settings;
    /// Settings::generate_default_config("novfmt.yaml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let yaml_content = serde_yml::to_string(&Self::default())
            .map_err(|e| EpubError::ConfigError(format!("序列化配置失败: {}", e)))?;

        let content_with_header = format!(
            "# novfmt 配置文件\n# compression_level: deflate压缩级别(0-9)，省略时使用默认级别\n\n{}",
            yaml_content
        );

        fs::write(path.as_ref(), content_with_header)
            .map_err(|e| EpubError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }

    fn check(&self) -> Result<()> {
        if let Some(level) = self.compression_level {
            if !(0..=9).contains(&level) {
                return Err(EpubError::ConfigError(format!(
                    "compression_level必须在0到9之间，当前为{}",
                    level
                )));
            }
        }
        Ok(())
    }
}
