use crate::epub::error::{EpubError, Result};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// container.xml在容器中的固定位置
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// OPF包文件的媒体类型
pub const PACKAGE_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Container.xml中的rootfile信息
#[derive(Debug, Clone, PartialEq)]
pub struct RootFile {
    pub full_path: String,
    pub media_type: Option<String>,
}

/// Container.xml的解析结果
#[derive(Debug, Clone)]
pub struct Container {
    pub rootfiles: Vec<RootFile>,
}

impl Container {
    /// 解析container.xml内容
    ///
    /// # 参数
    /// * `xml_content` - container.xml的文件内容
    ///
    /// # 返回值
    /// * `Result<Container, EpubError>` - 解析后的Container信息
    pub fn parse_xml(xml_content: &str) -> Result<Container> {
        let mut reader = Reader::from_str(xml_content);
        reader.config_mut().trim_text(true);
        reader.config_mut().expand_empty_elements = true;

        let mut rootfiles = Vec::new();
        let mut buf = Vec::new();
        let mut in_rootfiles = false;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| EpubError::ContainerParseError(e.to_string()))?;
            match event {
                Event::Start(ref e) => match e.local_name().as_ref() {
                    b"rootfiles" => {
                        in_rootfiles = true;
                    }
                    b"rootfile" if in_rootfiles => {
                        let mut full_path = String::new();
                        let mut media_type = None;

                        for attr_result in e.attributes() {
                            let attr = attr_result
                                .map_err(|e| EpubError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
                            let value = attr
                                .unescape_value()
                                .map_err(|e| EpubError::ContainerParseError(e.to_string()))?;
                            match attr.key.local_name().as_ref() {
                                b"full-path" => full_path = value.trim().to_string(),
                                b"media-type" => media_type = Some(value.to_string()),
                                _ => {}
                            }
                        }

                        if !full_path.is_empty() {
                            rootfiles.push(RootFile {
                                full_path,
                                media_type,
                            });
                        }
                    }
                    _ => {}
                },
                Event::End(ref e) => {
                    if e.local_name().as_ref() == b"rootfiles" {
                        in_rootfiles = false;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if rootfiles.is_empty() {
            return Err(EpubError::ContainerParseError(
                "没有找到任何rootfile条目".to_string(),
            ));
        }

        Ok(Container { rootfiles })
    }

    /// 获取OPF文件路径
    ///
    /// 始终取第一个rootfile，多rootfile的书籍只处理其默认版本。
    pub fn package_path(&self) -> Option<&str> {
        self.rootfiles.first().map(|rf| rf.full_path.as_str())
    }

    /// 生成指向给定OPF路径的container.xml
    pub fn render(package_path: &str) -> String {
        format!(
            concat!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
                "<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n",
                "  <rootfiles>\n",
                "    <rootfile full-path=\"{}\" media-type=\"{}\"/>\n",
                "  </rootfiles>\n",
                "</container>\n"
            ),
            escape(package_path),
            PACKAGE_MEDIA_TYPE
        )
    }
}
