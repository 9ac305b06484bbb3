//! The Azure DevOps TFVC REST `HistorySource` implementation (§10.2).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tfvc2git_core::error::{MigrationError, MigrationResult};
use tfvc2git_core::history::{Change, ChangeTypeFlags, ChangesetMeta, HistorySource, Item, Label, MergeSource};

const MAX_RETRIES: u32 = 4;
const API_VERSION: &str = "6.0";

pub struct AzureDevOpsHistorySource {
  client: Client,
  collection_url: String,
  pat: Option<String>,
}

impl AzureDevOpsHistorySource {
  pub fn new(collection_url: impl Into<String>, pat: Option<String>) -> Self {
    Self {
      client: Client::new(),
      collection_url: collection_url.into().trim_end_matches('/').to_string(),
      pat,
    }
  }

  fn request(&self, url: &str) -> RequestBuilder {
    let builder = self.client.get(url).query(&[("api-version", API_VERSION)]);
    match &self.pat {
      Some(pat) => builder.basic_auth("", Some(pat)),
      None => builder,
    }
  }

  async fn send_with_retry(&self, request: RequestBuilder) -> MigrationResult<Response> {
    let mut attempt = 0;
    loop {
      let cloned = request.try_clone().expect("requests built by this client carry no unclonable body");
      match cloned.send().await {
        Ok(response) if response.status().is_server_error() => {
          attempt += 1;
          if attempt > MAX_RETRIES {
            return Err(MigrationError::transient_io(format!(
              "Azure DevOps returned {} after {attempt} attempts",
              response.status()
            )));
          }
          tokio::time::sleep(backoff(attempt)).await;
        }
        Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
          attempt += 1;
          if attempt > MAX_RETRIES {
            return Err(MigrationError::transient_io("Azure DevOps rate limit exceeded retry budget".to_string()));
          }
          tokio::time::sleep(backoff(attempt)).await;
        }
        Ok(response) if !response.status().is_success() => {
          return Err(MigrationError::transient_io(format!("Azure DevOps request failed with status {}", response.status())));
        }
        Ok(response) => return Ok(response),
        Err(err) => {
          attempt += 1;
          if attempt > MAX_RETRIES || !(err.is_connect() || err.is_timeout()) {
            return Err(MigrationError::transient_io(format!("request to Azure DevOps failed: {err}")));
          }
          tokio::time::sleep(backoff(attempt)).await;
        }
      }
    }
  }
}

fn backoff(attempt: u32) -> Duration {
  Duration::from_millis(200 * 2u64.pow(attempt.min(5)))
}

fn parse_change_type(raw: &str) -> ChangeTypeFlags {
  let mut flags = ChangeTypeFlags::empty();
  for token in raw.split(',') {
    flags |= match token.trim().to_ascii_lowercase().as_str() {
      "add" => ChangeTypeFlags::ADD,
      "edit" => ChangeTypeFlags::EDIT,
      "encoding" => ChangeTypeFlags::ENCODING,
      "rename" => ChangeTypeFlags::RENAME,
      "delete" => ChangeTypeFlags::DELETE,
      "undelete" => ChangeTypeFlags::UNDELETE,
      "branch" => ChangeTypeFlags::BRANCH,
      "merge" => ChangeTypeFlags::MERGE,
      "lock" => ChangeTypeFlags::LOCK,
      "rollback" => ChangeTypeFlags::ROLLBACK,
      "sourcerename" => ChangeTypeFlags::SOURCE_RENAME,
      "targetrename" => ChangeTypeFlags::TARGET_RENAME,
      "property" => ChangeTypeFlags::PROPERTY,
      _ => ChangeTypeFlags::empty(),
    };
  }
  flags
}

#[derive(Debug, Deserialize)]
struct ValueEnvelope<T> {
  value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct IdentityDto {
  #[serde(rename = "displayName")]
  display_name: String,
}

#[derive(Debug, Deserialize)]
struct ChangesetDto {
  #[serde(rename = "changesetId")]
  changeset_id: i64,
  author: IdentityDto,
  #[serde(rename = "checkedInBy")]
  checked_in_by: IdentityDto,
  #[serde(rename = "createdDate")]
  created_date: DateTime<Utc>,
  comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemDto {
  path: String,
  #[serde(rename = "changesetVersion", default)]
  changeset_version: i64,
  #[serde(rename = "isFolder", default)]
  is_folder: bool,
  #[serde(rename = "isBranch", default)]
  is_branch: bool,
  #[serde(rename = "isSymLink", default)]
  is_symbolic_link: bool,
  #[serde(default)]
  size: u64,
  #[serde(rename = "hashValue")]
  hash: Option<String>,
}

impl From<ItemDto> for Item {
  fn from(dto: ItemDto) -> Self {
    Item {
      path: dto.path,
      changeset_version: dto.changeset_version,
      is_folder: dto.is_folder,
      is_branch: dto.is_branch,
      is_symbolic_link: dto.is_symbolic_link,
      size: dto.size,
      hash: dto.hash,
    }
  }
}

#[derive(Debug, Deserialize)]
struct MergeSourceDto {
  #[serde(rename = "serverItem")]
  server_item: String,
  #[serde(rename = "versionTo")]
  version_to: i64,
  #[serde(rename = "isRename", default)]
  is_rename: bool,
}

#[derive(Debug, Deserialize)]
struct ChangeDto {
  item: ItemDto,
  #[serde(rename = "changeType")]
  change_type: String,
  #[serde(rename = "sourceServerItem")]
  source_server_item: Option<String>,
  #[serde(rename = "mergeSources", default)]
  merge_sources: Vec<MergeSourceDto>,
}

#[derive(Debug, Deserialize)]
struct LabelDto {
  name: String,
  owner: IdentityDto,
  id: i64,
}

#[derive(Debug, Deserialize)]
struct LabelItemDto {
  #[serde(rename = "changesetVersion", default)]
  changeset_version: i64,
}

#[async_trait]
impl HistorySource for AzureDevOpsHistorySource {
  async fn list_changesets(&self, root_path: &str, min: Option<i64>, max: Option<i64>) -> MigrationResult<Vec<ChangesetMeta>> {
    let mut url = format!("{}/_apis/tfvc/changesets?searchCriteria.itemPath={root_path}", self.collection_url);
    if let Some(min) = min {
      url.push_str(&format!("&searchCriteria.fromId={min}"));
    }
    if let Some(max) = max {
      url.push_str(&format!("&searchCriteria.toId={max}"));
    }
    let response = self.send_with_retry(self.request(&url)).await?;
    let envelope: ValueEnvelope<ChangesetDto> = response.json().await.map_err(|e| MigrationError::transient_io(format!("parsing changesets response: {e}")))?;
    let mut changesets: Vec<ChangesetMeta> = envelope
      .value
      .into_iter()
      .map(|dto| ChangesetMeta {
        changeset_id: dto.changeset_id,
        author: dto.author.display_name,
        checked_in_by: dto.checked_in_by.display_name,
        created_date: dto.created_date,
        comment: dto.comment,
      })
      .collect();
    changesets.sort_by_key(|c| c.changeset_id);
    Ok(changesets)
  }

  async fn list_changeset_changes(&self, changeset_id: i64) -> MigrationResult<Vec<Change>> {
    let url = format!("{}/_apis/tfvc/changesets/{changeset_id}/changes", self.collection_url);
    let response = self.send_with_retry(self.request(&url)).await?;
    let envelope: ValueEnvelope<ChangeDto> = response.json().await.map_err(|e| MigrationError::transient_io(format!("parsing changes response: {e}")))?;
    Ok(
      envelope
        .value
        .into_iter()
        .map(|dto| Change {
          change_type: parse_change_type(&dto.change_type),
          source_server_item: dto.source_server_item,
          merge_sources: dto
            .merge_sources
            .into_iter()
            .map(|m| MergeSource {
              server_item: m.server_item,
              version_to: m.version_to,
              is_rename: m.is_rename,
            })
            .collect(),
          item: dto.item.into(),
        })
        .collect(),
    )
  }

  async fn list_items(&self, scope_paths: &[String], changeset: i64) -> MigrationResult<Vec<Item>> {
    let mut items = Vec::new();
    for scope_path in scope_paths {
      let url = format!(
        "{}/_apis/tfvc/items?scopePath={scope_path}&recursionLevel=Full&versionDescriptor.version={changeset}",
        self.collection_url
      );
      let response = self.send_with_retry(self.request(&url)).await?;
      let envelope: ValueEnvelope<ItemDto> = response.json().await.map_err(|e| MigrationError::transient_io(format!("parsing items response: {e}")))?;
      items.extend(envelope.value.into_iter().map(Item::from));
    }
    Ok(items)
  }

  async fn fetch_content(&self, path: &str, changeset: i64) -> MigrationResult<Vec<u8>> {
    let url = format!(
      "{}/_apis/tfvc/items?path={path}&versionDescriptor.version={changeset}&download=true",
      self.collection_url
    );
    let response = self.send_with_retry(self.request(&url)).await?;
    let bytes = response.bytes().await.map_err(|e| MigrationError::transient_io(format!("downloading content for '{path}': {e}")))?;
    Ok(bytes.to_vec())
  }

  async fn list_labels(&self, root_path: &str) -> MigrationResult<Vec<Label>> {
    let url = format!("{}/_apis/tfvc/labels?requestData.labelScope={root_path}", self.collection_url);
    let response = self.send_with_retry(self.request(&url)).await?;
    let envelope: ValueEnvelope<LabelDto> = response.json().await.map_err(|e| MigrationError::transient_io(format!("parsing labels response: {e}")))?;
    Ok(
      envelope
        .value
        .into_iter()
        .map(|dto| Label {
          name: dto.name,
          owner: dto.owner.display_name,
        })
        .collect(),
    )
  }

  async fn label_items(&self, label: &Label) -> MigrationResult<i64> {
    let url = format!("{}/_apis/tfvc/labels?requestData.labelScope={}&requestData.name={}", self.collection_url, label.owner, label.name);
    let response = self.send_with_retry(self.request(&url)).await?;
    let envelope: ValueEnvelope<LabelItemDto> = response.json().await.map_err(|e| MigrationError::transient_io(format!("parsing label items response: {e}")))?;
    envelope
      .value
      .iter()
      .map(|item| item.changeset_version)
      .max()
      .ok_or_else(|| MigrationError::invariant(format!("label '{}' has no items", label.name)))
  }
}
