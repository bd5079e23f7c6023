//! Multipart payloads for writes that may carry an image.

use reqwest::multipart::{Form, Part};
use std::path::Path;

use crate::error::ApiError;

/// Name of the multipart part holding the image.
const IMAGE_FIELD: &str = "blob_image";

/// Binary attachment uploaded alongside an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
  pub file_name: String,
  pub mime: String,
  pub bytes: Vec<u8>,
}

impl Attachment {
  pub fn new(file_name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
    Self {
      file_name: file_name.into(),
      mime: mime.into(),
      bytes,
    }
  }

  /// Read an image from disk, guessing its type from the extension.
  pub async fn from_path(path: &Path) -> std::io::Result<Self> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "upload".to_string());
    let mime = match path
      .extension()
      .and_then(|e| e.to_str())
      .map(str::to_ascii_lowercase)
      .as_deref()
    {
      Some("png") => "image/png",
      Some("jpg") | Some("jpeg") => "image/jpeg",
      Some("gif") => "image/gif",
      Some("svg") => "image/svg+xml",
      Some("webp") => "image/webp",
      _ => "application/octet-stream",
    };
    Ok(Self::new(file_name, mime, bytes))
  }
}

/// Text fields plus an optional image, rebuilt into a multipart form per send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
  fields: Vec<(String, String)>,
  attachment: Option<Attachment>,
}

impl FormData {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
    self.fields.push((name.to_string(), value.into()));
    self
  }

  /// Add the field only when a non-empty value is present.
  pub fn optional_text(self, name: &str, value: Option<&str>) -> Self {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
      Some(value) => self.text(name, value),
      None => self,
    }
  }

  pub fn attachment(mut self, attachment: Option<Attachment>) -> Self {
    self.attachment = attachment;
    self
  }

  pub fn fields(&self) -> &[(String, String)] {
    &self.fields
  }

  pub fn field(&self, name: &str) -> Option<&str> {
    self
      .fields
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, v)| v.as_str())
  }

  pub fn has_attachment(&self) -> bool {
    self.attachment.is_some()
  }

  pub(crate) fn into_multipart(self) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for (name, value) in self.fields {
      form = form.text(name, value);
    }
    if let Some(attachment) = self.attachment {
      let part = Part::bytes(attachment.bytes)
        .file_name(attachment.file_name)
        .mime_str(&attachment.mime)
        .map_err(|e| ApiError::Validation {
          status: 400,
          message: format!("invalid attachment type: {}", e),
        })?;
      form = form.part(IMAGE_FIELD, part);
    }
    Ok(form)
  }
}

#[derive(Debug, Clone, Default)]
pub struct BankForm {
  pub name: String,
  pub short_name: Option<String>,
  pub slug: Option<String>,
  pub image: Option<Attachment>,
}

impl From<BankForm> for FormData {
  fn from(form: BankForm) -> Self {
    FormData::new()
      .text("name", form.name)
      .optional_text("shortName", form.short_name.as_deref())
      .optional_text("slug", form.slug.as_deref())
      .attachment(form.image)
  }
}

#[derive(Debug, Clone, Default)]
pub struct CategoryForm {
  pub name: String,
  /// Only sent on create; a category cannot change group through update.
  pub group_id: Option<String>,
  pub image: Option<Attachment>,
}

impl From<CategoryForm> for FormData {
  fn from(form: CategoryForm) -> Self {
    FormData::new()
      .text("name", form.name)
      .optional_text("groupId", form.group_id.as_deref())
      .attachment(form.image)
  }
}

#[derive(Debug, Clone, Default)]
pub struct GroupForm {
  pub name: String,
  pub image: Option<Attachment>,
}

impl From<GroupForm> for FormData {
  fn from(form: GroupForm) -> Self {
    FormData::new().text("name", form.name).attachment(form.image)
  }
}

#[derive(Debug, Clone, Default)]
pub struct IconForm {
  pub slug: String,
  /// Comma-separated search tags
  pub tags: Option<String>,
  pub image: Option<Attachment>,
}

impl From<IconForm> for FormData {
  fn from(form: IconForm) -> Self {
    FormData::new()
      .text("slug", form.slug.trim())
      .optional_text("tags", form.tags.as_deref())
      .attachment(form.image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bank_form_skips_empty_optionals() {
    let data = FormData::from(BankForm {
      name: "Kedil Bank".to_string(),
      short_name: Some("  ".to_string()),
      slug: Some("kedil".to_string()),
      image: None,
    });
    assert_eq!(data.field("name"), Some("Kedil Bank"));
    assert_eq!(data.field("shortName"), None);
    assert_eq!(data.field("slug"), Some("kedil"));
    assert!(!data.has_attachment());
  }

  #[test]
  fn test_icon_form_trims_slug_and_tags() {
    let data = FormData::from(IconForm {
      slug: " wallet ".to_string(),
      tags: Some(" money, cash ".to_string()),
      image: Some(Attachment::new("wallet.svg", "image/svg+xml", vec![1, 2, 3])),
    });
    assert_eq!(data.field("slug"), Some("wallet"));
    assert_eq!(data.field("tags"), Some("money, cash"));
    assert!(data.has_attachment());
  }

  #[tokio::test]
  async fn test_attachment_from_path_guesses_mime() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logo.PNG");
    tokio::fs::write(&path, b"png").await.unwrap();

    let attachment = Attachment::from_path(&path).await.unwrap();
    assert_eq!(attachment.file_name, "logo.PNG");
    assert_eq!(attachment.mime, "image/png");
    assert_eq!(attachment.bytes, b"png");
  }
}
