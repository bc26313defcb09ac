//! Channel lineup lookup
//!
//! Public endpoint, no session needed. Used to resolve channel names and
//! numbers to the ids that channel-change commands carry.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::LineupConfig;

#[derive(Debug, Error)]
pub enum LineupError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Lineup request rejected: {0}")]
    Status(String),
}

/// A linear channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub title: String,
    pub number: Option<u32>,
    pub id: String,
    pub logo: Option<String>,
}

/// Channel descriptor as served by the lineup endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelDescriptor {
    id: String,
    name: String,
    logical_channel_number: Option<u32>,
    logo: Option<Logo>,
}

#[derive(Debug, Deserialize)]
struct Logo {
    focused: Option<String>,
}

impl ChannelInfo {
    /// Title contains `query`, ignoring case
    pub fn matches(&self, query: &str) -> bool {
        self.title.to_lowercase().contains(&query.to_lowercase())
    }
}

impl From<ChannelDescriptor> for ChannelInfo {
    fn from(d: ChannelDescriptor) -> Self {
        Self {
            title: d.name,
            number: d.logical_channel_number,
            id: d.id,
            logo: d.logo.and_then(|logo| logo.focused),
        }
    }
}

/// Fetch the full lineup
pub async fn fetch_channels(client: &Client, config: &LineupConfig) -> Result<Vec<ChannelInfo>, LineupError> {
    let city_id = config.city_id.to_string();
    let resp = client
        .get(&config.channels_url)
        .query(&[
            ("cityId", city_id.as_str()),
            ("language", config.language.as_str()),
            ("productClass", config.product_class.as_str()),
        ])
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(LineupError::Status(
            status
                .canonical_reason()
                .map(String::from)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
        ));
    }

    let descriptors: Vec<ChannelDescriptor> = resp.json().await?;
    debug!("Lineup has {} channels", descriptors.len());

    Ok(descriptors.into_iter().map(ChannelInfo::from).collect())
}

/// Channels whose title contains `query`, ignoring case
pub fn filter_channels<'a>(channels: &'a [ChannelInfo], query: &str) -> Vec<&'a ChannelInfo> {
    channels.iter().filter(|channel| channel.matches(query)).collect()
}

/// Channel by logical number
pub fn find_by_number(channels: &[ChannelInfo], number: u32) -> Option<&ChannelInfo> {
    channels.iter().find(|channel| channel.number == Some(number))
}
