// 该文件是 Huishou （回收） 项目的一部分。
// src/input.rs - 待分析图像输入
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Huishou contributors

use std::path::{Path, PathBuf};

use image::ImageFormat;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

pub const NOT_AN_IMAGE_MESSAGE: &str = "Please select an image file (JPG, PNG, JPEG)";
pub const READ_ERROR_MESSAGE: &str = "Error reading image file";

#[derive(Error, Debug)]
pub enum ImageUploadError {
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
  #[error("Invalid path: {0}")]
  InvalidPath(String),
  #[error("Not an image file: {0}")]
  NotAnImage(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

impl ImageUploadError {
  pub fn user_message(&self) -> &'static str {
    match self {
      ImageUploadError::NotAnImage(_) => NOT_AN_IMAGE_MESSAGE,
      _ => READ_ERROR_MESSAGE,
    }
  }
}

/// 一张待上传的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
  file_name: String,
  mime_type: &'static str,
  bytes: Vec<u8>,
}

impl FromUrlWithScheme for ImageUpload {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageUpload {
  type Error = ImageUploadError;

  /// 接受 `image:///path/to.png` 与 `file:///path/to.png`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME && url.scheme() != "file" {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageUploadError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = urlencoding::decode(url.path())
      .map_err(|_| ImageUploadError::InvalidPath(url.path().to_string()))?;
    Self::from_path(PathBuf::from(path.as_ref()))
  }
}

impl ImageUpload {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImageUploadError> {
    let path = path.as_ref();
    ImageFormat::from_path(path)
      .map_err(|_| ImageUploadError::NotAnImage(path.display().to_string()))?;
    let bytes = std::fs::read(path)?;
    debug!("读取图像 {} ({} 字节)", path.display(), bytes.len());
    // 扩展名之外还要看文件内容
    let format = image::guess_format(&bytes)
      .map_err(|_| ImageUploadError::NotAnImage(path.display().to_string()))?;

    let file_name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| "upload".to_string());

    Ok(Self {
      file_name,
      mime_type: format.to_mime_type(),
      bytes,
    })
  }

  /// 根据文件内容判断格式
  pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ImageUploadError> {
    let file_name = file_name.into();
    let format =
      image::guess_format(&bytes).map_err(|_| ImageUploadError::NotAnImage(file_name.clone()))?;
    Ok(Self {
      file_name,
      mime_type: format.to_mime_type(),
      bytes,
    })
  }

  pub fn file_name(&self) -> &str {
    &self.file_name
  }

  pub fn mime_type(&self) -> &'static str {
    self.mime_type
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

  pub(crate) fn sample_png() -> ImageUpload {
    ImageUpload::from_bytes("bottle.png", PNG_MAGIC.to_vec()).unwrap()
  }

  #[test]
  fn sniffs_png_bytes() {
    let upload = sample_png();
    assert_eq!(upload.mime_type(), "image/png");
    assert_eq!(upload.file_name(), "bottle.png");
  }

  #[test]
  fn rejects_non_image_bytes() {
    let err = ImageUpload::from_bytes("notes.txt", b"hello world".to_vec()).unwrap_err();
    assert!(matches!(err, ImageUploadError::NotAnImage(_)));
    assert_eq!(err.user_message(), NOT_AN_IMAGE_MESSAGE);
  }

  #[test]
  fn loads_from_image_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("waste photo.jpg");
    std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let upload = ImageUpload::from_url(&url).unwrap();
    assert_eq!(upload.file_name(), "waste photo.jpg");
    assert_eq!(upload.mime_type(), "image/jpeg");
    assert_eq!(upload.bytes(), &[0xFF, 0xD8, 0xFF, 0xE0]);

    let image_url = Url::parse(&format!("image://{}", url.path())).unwrap();
    assert_eq!(ImageUpload::from_url(&image_url).unwrap(), upload);
  }

  #[test]
  fn rejects_wrong_scheme_and_extension() {
    let url = Url::parse("http://localhost/a.png").unwrap();
    assert!(matches!(
      ImageUpload::from_url(&url),
      Err(ImageUploadError::SchemeMismatch(_))
    ));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.txt");
    std::fs::write(&path, "not an image").unwrap();
    let err = ImageUpload::from_path(&path).unwrap_err();
    assert_eq!(err.user_message(), NOT_AN_IMAGE_MESSAGE);
  }

  #[test]
  fn image_extension_with_text_content_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fake.png");
    std::fs::write(&path, "definitely not a png").unwrap();
    let err = ImageUpload::from_path(&path).unwrap_err();
    assert!(matches!(err, ImageUploadError::NotAnImage(_)));
    assert_eq!(err.user_message(), NOT_AN_IMAGE_MESSAGE);
  }

  #[test]
  fn content_decides_mime_type() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.jpg");
    std::fs::write(&path, PNG_MAGIC).unwrap();
    assert_eq!(ImageUpload::from_path(&path).unwrap().mime_type(), "image/png");
  }

  #[test]
  fn missing_file_is_read_error() {
    let err = ImageUpload::from_path("/nonexistent/huishou/missing.png").unwrap_err();
    assert!(matches!(err, ImageUploadError::IoError(_)));
    assert_eq!(err.user_message(), READ_ERROR_MESSAGE);
  }
}
