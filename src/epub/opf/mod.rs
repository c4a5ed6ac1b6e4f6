//! OPF（Open Packaging Format）文件模块
//!
//! 此模块提供EPUB文件中OPF包文件的解析与写出功能，包括元数据、清单、脊柱等信息。

mod manifest;
mod metadata;
mod parser;
mod spine;
mod writer;

pub use manifest::{ManifestItem, XHTML_MEDIA_TYPE};
pub use metadata::{DcMeta, ExtraElement, MetaNode, Metadata, MODIFIED_PROPERTY};
pub use parser::PackageDocument;
pub use spine::{GuideReference, Spine, SpineItem};
pub use writer::{NS_DC, NS_OPF};
