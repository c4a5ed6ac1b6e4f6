//! 测试用EPUB构造工具

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// 写出一个EPUB：mimetype在前且不压缩，其余条目按给定顺序写入
pub fn write_epub(path: &Path, files: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    for (name, content) in files {
        zip.start_file(*name, deflated).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// 测试书籍描述
pub struct BookFixture {
    pub name: String,
    pub title: String,
    pub language: String,
    pub creators: Vec<String>,
    pub description: Option<String>,
    pub chapters: Vec<(String, String)>,
    pub nav: bool,
}

impl BookFixture {
    pub fn new(name: &str, title: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            language: "en".to_string(),
            creators: vec!["Test Author".to_string()],
            description: None,
            chapters: Vec::new(),
            nav: true,
        }
    }

    pub fn chapter(mut self, id: &str, body: &str) -> Self {
        self.chapters.push((id.to_string(), body.to_string()));
        self
    }

    pub fn language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn without_nav(mut self) -> Self {
        self.nav = false;
        self
    }
}

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

/// 章节XHTML模板
pub fn chapter_xhtml(id: &str, body: &str) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<!DOCTYPE html>\n",
            "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\">",
            "<head><title>{}</title><link rel=\"stylesheet\" href=\"../Styles/style.css\"/></head>",
            "<body>{}</body></html>\n"
        ),
        id, body
    )
}

/// 在 `dir` 下写出 `{name}.epub` 并返回路径
pub fn write_book(dir: &Path, book: &BookFixture) -> PathBuf {
    let mut metadata = format!(
        "    <dc:title>{}</dc:title>\n    <dc:language>{}</dc:language>\n    <dc:identifier id=\"BookId\">urn:test:{}</dc:identifier>\n",
        book.title, book.language, book.name
    );
    for creator in &book.creators {
        metadata.push_str(&format!("    <dc:creator opf:role=\"aut\">{}</dc:creator>\n", creator));
    }
    if let Some(description) = &book.description {
        metadata.push_str(&format!("    <dc:description>{}</dc:description>\n", description));
    }
    metadata.push_str("    <meta property=\"dcterms:modified\">2020-01-01T00:00:00Z</meta>\n");

    let mut manifest = String::new();
    if book.nav {
        manifest.push_str(
            "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
        );
    }
    manifest.push_str("    <item id=\"css\" href=\"Styles/style.css\" media-type=\"text/css\"/>\n");
    let mut spine = String::new();
    let mut nav_links = String::new();
    for (id, _) in &book.chapters {
        manifest.push_str(&format!(
            "    <item id=\"{id}\" href=\"Text/{id}.xhtml\" media-type=\"application/xhtml+xml\"/>\n"
        ));
        spine.push_str(&format!("    <itemref idref=\"{id}\"/>\n"));
        nav_links.push_str(&format!("<li><a href=\"Text/{id}.xhtml\">{id}</a></li>"));
    }

    let opf = format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"BookId\" version=\"3.0\">\n",
            "  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:opf=\"http://www.idpf.org/2007/opf\">\n",
            "{}  </metadata>\n  <manifest>\n{}  </manifest>\n  <spine>\n{}  </spine>\n</package>\n"
        ),
        metadata, manifest, spine
    );
    let nav = format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\">",
            "<head><title>nav</title></head><body><nav epub:type=\"toc\" id=\"toc\"><ol>{}</ol></nav></body></html>\n"
        ),
        nav_links
    );

    let chapters: Vec<(String, String)> = book
        .chapters
        .iter()
        .map(|(id, body)| (format!("OEBPS/Text/{}.xhtml", id), chapter_xhtml(id, body)))
        .collect();

    let mut files: Vec<(&str, &str)> = vec![
        ("META-INF/container.xml", CONTAINER_XML),
        ("OEBPS/content.opf", opf.as_str()),
        ("OEBPS/Styles/style.css", "p { margin: 0; }\n"),
    ];
    if book.nav {
        files.push(("OEBPS/nav.xhtml", nav.as_str()));
    }
    for (name, content) in &chapters {
        files.push((name.as_str(), content.as_str()));
    }

    let path = dir.join(format!("{}.epub", book.name));
    write_epub(&path, &files);
    path
}
