use crate::epub::archive;
use crate::epub::container::{CONTAINER_PATH, Container};
use crate::epub::error::{EpubError, Result};
use crate::epub::opf::PackageDocument;
use percent_encoding::percent_decode_str;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// 一本已解压的EPUB
///
/// 解压目录归本实例独占，实例被丢弃时目录随之删除，
/// 无论调用方的操作成功还是失败。
pub struct Volume {
    workdir: TempDir,
    source: PathBuf,
    package: PackageDocument,
    package_path: PathBuf,
    /// 包文件在容器内的相对路径（以 `/` 分隔）
    package_entry: String,
    nav_href: String,
}

impl Volume {
    /// 打开EPUB文件
    ///
    /// 解压容器，读取 `META-INF/container.xml` 中的第一个rootfile，并解析OPF包文件。
    ///
    /// # 参数
    /// * `path` - epub文件的路径
    ///
    /// # 返回值
    /// * `Result<Volume, EpubError>` - 成功返回Volume实例，失败返回错误
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Volume> {
        let source = path.as_ref().to_path_buf();
        let workdir = archive::extract(&source)?;

        let container_file = workdir.path().join(CONTAINER_PATH);
        let container_xml = fs::read_to_string(&container_file).map_err(|e| {
            EpubError::ContainerParseError(format!("无法读取{}: {}", CONTAINER_PATH, e))
        })?;
        let container = Container::parse_xml(&container_xml)?;
        let package_entry = container
            .package_path()
            .ok_or_else(|| EpubError::ContainerParseError("container.xml中没有找到有效的rootfile".to_string()))?
            .trim_start_matches('/')
            .to_string();

        let package_path = workdir.path().join(&package_entry);
        let package_xml = fs::read_to_string(&package_path).map_err(|e| {
            EpubError::OpfParseError(format!("无法读取包文件 {}: {}", package_entry, e))
        })?;
        let package = PackageDocument::parse_xml(&package_xml)?;

        let nav_href = package
            .nav_item()
            .map(|item| item.href.clone())
            .unwrap_or_default();
        if nav_href.is_empty() {
            warn!(volume = %source.display(), "没有找到导航文档");
        }

        debug!(
            volume = %source.display(),
            package = %package_entry,
            manifest = package.manifest.len(),
            spine = package.spine.itemrefs.len(),
            "打开EPUB"
        );

        Ok(Volume {
            workdir,
            source,
            package,
            package_path,
            package_entry,
            nav_href,
        })
    }

    /// 打开时使用的EPUB路径
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// 解压目录
    pub fn root(&self) -> &Path {
        self.workdir.path()
    }

    /// 包文档
    pub fn package(&self) -> &PackageDocument {
        &self.package
    }

    /// 可修改的包文档
    pub fn package_mut(&mut self) -> &mut PackageDocument {
        &mut self.package
    }

    /// 包文件的磁盘路径
    pub fn package_path(&self) -> &Path {
        &self.package_path
    }

    /// 导航文档的href，没有导航文档时为空
    pub fn nav_href(&self) -> &str {
        &self.nav_href
    }

    /// 导航文档的磁盘路径
    ///
    /// 没有导航文档时返回格式错误。
    pub fn nav_path(&self) -> Result<PathBuf> {
        if self.nav_href.is_empty() {
            return Err(EpubError::NavError(format!(
                "{} 中没有导航文档",
                self.source.display()
            )));
        }
        self.resolve(&self.nav_href)
    }

    /// 把清单href解析为解压目录内的磁盘路径
    ///
    /// 解码后越出解压目录时返回格式错误。
    pub fn resolve(&self, href: &str) -> Result<PathBuf> {
        let relative = self.container_path(href)?;
        let mut path = self.root().to_path_buf();
        for segment in relative.split('/') {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(part)), None) => path.push(part),
                _ => return Err(escape_error(href)),
            }
        }
        Ok(path)
    }

    /// 清单href解码并规范化后相对于容器根目录的路径（以 `/` 分隔）
    pub fn container_path(&self, href: &str) -> Result<String> {
        let decoded = percent_decode_str(strip_fragment(href)).decode_utf8_lossy();
        normalize_href(self.package_base(), &decoded).ok_or_else(|| escape_error(href))
    }

    /// 把清单href换算为相对于容器根目录的路径（以 `/` 分隔，保持编码）
    ///
    /// 解码前后指向不同位置或越出容器根目录时返回格式错误。
    pub fn container_relative(&self, href: &str) -> Result<String> {
        let decoded = self.container_path(href)?;
        let relative = normalize_href(self.package_base(), strip_fragment(href)).ok_or_else(|| escape_error(href))?;
        if percent_decode_str(&relative).decode_utf8_lossy().as_ref() != decoded.as_str() {
            return Err(escape_error(href));
        }
        Ok(relative)
    }

    fn package_base(&self) -> &str {
        match self.package_entry.rfind('/') {
            Some(index) => &self.package_entry[..index],
            None => "",
        }
    }

    /// 把包文档写回磁盘
    pub fn save_package(&self) -> Result<()> {
        let xml = self.package.to_xml()?;
        fs::write(&self.package_path, xml).map_err(|e| EpubError::file(&self.package_path, e))
    }

    /// 把解压目录重新打包到 `dest`
    pub fn repack(&self, dest: &Path, compression_level: Option<i64>) -> Result<()> {
        archive::pack(self.root(), dest, compression_level)
    }
}

fn escape_error(href: &str) -> EpubError {
    EpubError::OpfParseError(format!("清单路径越出了容器根目录: {}", href))
}

fn strip_fragment(href: &str) -> &str {
    href.split(['#', '?']).next().unwrap_or(href)
}

/// 以 `/` 分隔的路径规范化：去掉 `.`，回退 `..`，越出根目录时返回None
pub(crate) fn normalize_href(base: &str, href: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    let joined = if href.starts_with('/') {
        href.to_string()
    } else {
        format!("{}/{}", base, href)
    };
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::test_support::{BookFixture, write_book};
    use tempfile::tempdir;

    #[test]
    fn test_open_locates_package_and_nav() {
        let dir = tempdir().unwrap();
        let path = write_book(dir.path(), &BookFixture::new("book", "第一卷").chapter("c1", "<p>内容</p>"));

        let volume = Volume::open(&path).unwrap();
        assert_eq!(volume.package().metadata.title(), Some("第一卷"));
        assert_eq!(volume.nav_href(), "nav.xhtml");
        assert!(volume.nav_path().unwrap().is_file());
        assert!(volume.package_path().ends_with("OEBPS/content.opf"));
        assert!(volume.resolve("Text/c1.xhtml").unwrap().is_file());
    }

    #[test]
    fn test_workdir_removed_on_drop() {
        let dir = tempdir().unwrap();
        let path = write_book(dir.path(), &BookFixture::new("book", "书").chapter("c1", "<p>x</p>"));
        let volume = Volume::open(&path).unwrap();
        let root = volume.root().to_path_buf();
        assert!(root.exists());
        drop(volume);
        assert!(!root.exists());
    }

    #[test]
    fn test_missing_nav_is_explicit_error() {
        let dir = tempdir().unwrap();
        let book = BookFixture::new("book", "EPUB2").chapter("c1", "<p>x</p>").without_nav();
        let volume = Volume::open(write_book(dir.path(), &book)).unwrap();
        assert_eq!(volume.nav_href(), "");
        let err = volume.nav_path().unwrap_err();
        assert_eq!(err.kind(), crate::epub::error::ErrorKind::Format);
    }

    #[test]
    fn test_missing_container_is_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.epub");
        crate::epub::test_support::write_epub(&path, &[("OEBPS/content.opf", "<package/>")]);
        let err = Volume::open(&path).err().unwrap();
        assert!(matches!(err, EpubError::ContainerParseError(_)));
    }

    #[test]
    fn test_round_trip_without_changes() {
        let dir = tempdir().unwrap();
        let path = write_book(
            dir.path(),
            &BookFixture::new("book", "往返").chapter("c1", "<p>一</p>").chapter("c2", "<p>二</p>"),
        );
        let volume = Volume::open(&path).unwrap();
        let before = volume.package().clone();

        let repacked = dir.path().join("repacked.epub");
        volume.repack(&repacked, None).unwrap();
        let reopened = Volume::open(&repacked).unwrap();
        assert_eq!(reopened.package(), &before);
    }

    #[test]
    fn test_resolve_stays_inside_workdir() {
        let dir = tempdir().unwrap();
        let path = write_book(dir.path(), &BookFixture::new("book", "书").chapter("c1", "<p>x</p>"));
        let volume = Volume::open(&path).unwrap();

        let inside = volume.resolve("Text/../Text/c1.xhtml#top").unwrap();
        assert_eq!(inside, volume.root().join("OEBPS").join("Text").join("c1.xhtml"));
        assert_eq!(volume.container_relative("Text/a%20b.xhtml").unwrap(), "OEBPS/Text/a%20b.xhtml");

        for href in ["../../victim.xhtml", "%2E%2E/%2E%2E/victim.xhtml", "Text%2F..%2F..%2F..%2Fvictim.xhtml"] {
            assert_eq!(volume.resolve(href).unwrap_err().kind(), crate::epub::error::ErrorKind::Format, "{}", href);
            assert!(volume.container_relative(href).is_err(), "{}", href);
        }
        // 解码前后指向不同文件
        assert!(volume.container_relative("a%2F..%2Fb.xhtml").is_err());
    }

    #[test]
    fn test_normalize_href() {
        assert_eq!(normalize_href("OEBPS", "Text/../Images/a.jpg"), Some("OEBPS/Images/a.jpg".to_string()));
        assert_eq!(normalize_href("", "./content.xhtml"), Some("content.xhtml".to_string()));
        assert_eq!(normalize_href("OEBPS", "../../etc/passwd"), None);
    }
}
