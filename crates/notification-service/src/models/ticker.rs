//! 滚动公告（ticker）条目
//!
//! 公告栏由三类来源合并而成：运营手工配置的条目、即将开始的活动、最新发布的机会。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 条目来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickerSource {
    Manual,
    AutoEvent,
    AutoOpportunity,
}

/// 运营配置的公告条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ManualTickerItem {
    pub id: String,
    pub title: String,
    pub message: String,
    pub item_type: String,
    pub variant: String,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
    pub icon: Option<String>,
    pub priority: i32,
}

/// 即将开始的活动摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingEvent {
    pub id: String,
    pub title: String,
    pub event_type: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub location: Option<String>,
}

/// 最新发布的机会摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OpportunitySummary {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub category: Option<String>,
    pub job_type: Option<String>,
    pub is_featured: bool,
}

/// 合并后的公告条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerItem {
    pub id: String,
    pub original_id: String,
    pub title: String,
    pub message: String,
    pub item_type: String,
    pub variant: String,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
    pub icon: Option<String>,
    pub priority: i32,
    pub source: TickerSource,
}

impl From<ManualTickerItem> for TickerItem {
    fn from(item: ManualTickerItem) -> Self {
        Self {
            id: item.id.clone(),
            original_id: item.id,
            title: item.title,
            message: item.message,
            item_type: item.item_type,
            variant: item.variant,
            action_url: item.action_url,
            action_label: item.action_label,
            icon: item.icon,
            priority: item.priority,
            source: TickerSource::Manual,
        }
    }
}

impl From<UpcomingEvent> for TickerItem {
    fn from(event: UpcomingEvent) -> Self {
        let kind = event.event_type.as_deref().unwrap_or("event");
        let mut message = format!("{} on {}", kind, event.starts_at.format("%b %-d"));
        if let Some(location) = event.location.as_deref() {
            message.push_str(&format!(" at {location}"));
        }

        Self {
            id: format!("event-{}", event.id),
            action_url: Some(format!("/events/{}", event.id)),
            original_id: event.id,
            title: event.title,
            message,
            item_type: "event".to_string(),
            variant: "info".to_string(),
            action_label: Some("View Event".to_string()),
            icon: Some("calendar".to_string()),
            priority: 4,
            source: TickerSource::AutoEvent,
        }
    }
}

impl From<OpportunitySummary> for TickerItem {
    fn from(job: OpportunitySummary) -> Self {
        let mut message = format!("{} is hiring", job.company);
        if let Some(location) = job.location.as_deref() {
            message.push_str(&format!(" in {location}"));
        }
        if let Some(job_type) = job.job_type.as_deref() {
            message.push_str(&format!(" ({job_type})"));
        }
        let is_internship = job.category.as_deref() == Some("internship");

        Self {
            id: format!("job-{}", job.id),
            action_url: Some(format!("/opportunities/{}", job.id)),
            original_id: job.id,
            title: job.title,
            message,
            item_type: if is_internship { "internship" } else { "job" }.to_string(),
            variant: if job.is_featured { "success" } else { "info" }.to_string(),
            action_label: Some("Apply Now".to_string()),
            icon: Some("briefcase".to_string()),
            priority: if job.is_featured { 4 } else { 3 },
            source: TickerSource::AutoOpportunity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_featured_opportunity_gets_higher_priority() {
        let job = OpportunitySummary {
            id: "j1".to_string(),
            title: "Backend Engineer".to_string(),
            company: "Acme".to_string(),
            location: Some("Pune".to_string()),
            category: Some("job".to_string()),
            job_type: Some("full-time".to_string()),
            is_featured: true,
        };

        let item = TickerItem::from(job.clone());
        assert_eq!(item.priority, 4);
        assert_eq!(item.message, "Acme is hiring in Pune (full-time)");
        assert_eq!(item.id, "job-j1");

        let plain = TickerItem::from(OpportunitySummary {
            is_featured: false,
            category: Some("internship".to_string()),
            ..job
        });
        assert_eq!(plain.priority, 3);
        assert_eq!(plain.item_type, "internship");
    }

    #[test]
    fn test_event_item_links_to_event() {
        let item = TickerItem::from(UpcomingEvent {
            id: "e1".to_string(),
            title: "Reunion".to_string(),
            event_type: None,
            starts_at: Utc::now(),
            location: None,
        });
        assert_eq!(item.action_url.as_deref(), Some("/events/e1"));
        assert_eq!(item.source, TickerSource::AutoEvent);
        assert_eq!(item.priority, 4);
    }
}
