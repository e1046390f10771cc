//! Calendar events written as RFC 5545 `.ics` files.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use policy::CapabilityRequest;
use serde_json::{Value, json};

use crate::args::{optional_str, optional_u64, required_str};
use crate::{Tool, ToolContext, ToolError};

const DEFAULT_DURATION_MINUTES: u64 = 60;
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Create an `.ics` calendar file for a single event.
pub struct CreateCalendarEvent;

/// An event time: either floating local time or an absolute UTC instant.
#[derive(Debug, Clone, Copy, PartialEq)]
enum EventTime {
    Floating(NaiveDateTime),
    Utc(DateTime<Utc>),
}

impl EventTime {
    fn parse(s: &str) -> Result<Self, ToolError> {
        let s = s.trim();
        if let Ok(t) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::Utc(t.with_timezone(&Utc)));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(Self::Floating)
            .ok_or_else(|| {
                ToolError::InvalidInput(format!(
                    "invalid date-time '{s}', expected ISO 8601 like 2025-03-14T15:00"
                ))
            })
    }

    fn naive(&self) -> NaiveDateTime {
        match self {
            Self::Floating(t) => *t,
            Self::Utc(t) => t.naive_utc(),
        }
    }

    fn checked_add(&self, d: TimeDelta) -> Option<Self> {
        match self {
            Self::Floating(t) => t.checked_add_signed(d).map(Self::Floating),
            Self::Utc(t) => t.checked_add_signed(d).map(Self::Utc),
        }
    }

    fn to_ics(self) -> String {
        match self {
            Self::Floating(t) => t.format("%Y%m%dT%H%M%S").to_string(),
            Self::Utc(t) => t.format("%Y%m%dT%H%M%SZ").to_string(),
        }
    }
}

#[async_trait]
impl Tool for CreateCalendarEvent {
    fn name(&self) -> &str {
        "create_calendar_event"
    }

    fn description(&self) -> &str {
        "Create a calendar event (meeting, appointment, reminder) and save it as an .ics file that calendar apps can import."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Event title"},
                "start": {"type": "string", "description": "Start date and time, ISO 8601 (e.g. 2025-03-14T15:00)"},
                "end": {"type": "string", "description": "End date and time, ISO 8601. Optional"},
                "duration_minutes": {"type": "integer", "description": "Length in minutes when no end is given (default: 60)"},
                "description": {"type": "string", "description": "Event notes"},
                "location": {"type": "string", "description": "Where the event takes place"},
                "path": {"type": "string", "description": "Output .ics file (default: derived from the title)"}
            },
            "required": ["title", "start"]
        })
    }

    fn capabilities(&self, args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
        let Some(title) = optional_str(args, "title") else {
            return Vec::new();
        };
        let path = output_path(args, title);
        vec![CapabilityRequest::fs_write(
            ctx.resolve(path).display().to_string(),
        )]
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let title = required_str(&args, "title")?;
        let start = EventTime::parse(required_str(&args, "start")?)?;

        let end = match optional_str(&args, "end") {
            Some(end) => EventTime::parse(end)?,
            None => {
                let minutes =
                    optional_u64(&args, "duration_minutes")?.unwrap_or(DEFAULT_DURATION_MINUTES);
                i64::try_from(minutes)
                    .ok()
                    .and_then(TimeDelta::try_minutes)
                    .and_then(|d| start.checked_add(d))
                    .ok_or_else(|| ToolError::InvalidInput("duration out of range".into()))?
            }
        };

        if std::mem::discriminant(&start) != std::mem::discriminant(&end) {
            return Err(ToolError::InvalidInput(
                "start and end must both carry a UTC offset or both omit it".into(),
            ));
        }
        if end.naive() <= start.naive() {
            return Err(ToolError::InvalidInput("end must be after start".into()));
        }

        let ics = render_ics(
            title,
            start,
            end,
            optional_str(&args, "description"),
            optional_str(&args, "location"),
            Utc::now(),
        );

        let path = ctx.resolve(output_path(&args, title));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, ics).await?;

        Ok(json!({
            "file": path.display().to_string(),
            "title": title,
            "start": start.naive().to_string(),
            "end": end.naive().to_string(),
        }))
    }
}

fn output_path(args: &Value, title: &str) -> String {
    optional_str(args, "path")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.ics", slug(title)))
}

fn slug(title: &str) -> String {
    let slug = title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "event".to_string()
    } else {
        slug
    }
}

/// Escape TEXT values (RFC 5545 §3.3.11).
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

fn render_ics(
    title: &str,
    start: EventTime,
    end: EventTime,
    description: Option<&str>,
    location: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//llm-toolchain//calendar//EN".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@llm-toolchain", uuid::Uuid::new_v4()),
        format!("DTSTAMP:{}", now.format("%Y%m%dT%H%M%SZ")),
        format!("DTSTART:{}", start.to_ics()),
        format!("DTEND:{}", end.to_ics()),
        format!("SUMMARY:{}", escape(title)),
    ];
    if let Some(description) = description {
        lines.push(format!("DESCRIPTION:{}", escape(description)));
    }
    if let Some(location) = location {
        lines.push(format!("LOCATION:{}", escape(location)));
    }
    lines.push("END:VEVENT".to_string());
    lines.push("END:VCALENDAR".to_string());

    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn huge_duration_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        for minutes in [1e15, 1e12] {
            let err = CreateCalendarEvent
                .execute(
                    json!({"title": "x", "start": "2025-01-01T10:00", "duration_minutes": minutes}),
                    &ctx,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidInput(ref m) if m == "duration out of range"));
        }

        let err = CreateCalendarEvent
            .execute(
                json!({"title": "x", "start": "2025-01-01T10:00:00Z", "duration_minutes": 1e12}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
        assert!(!dir.path().join("x.ics").exists());
    }

    #[tokio::test]
    async fn writes_ics_with_default_duration() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        let out = CreateCalendarEvent
            .execute(
                json!({
                    "title": "Team Sync, weekly",
                    "start": "2025-03-14T15:00",
                    "location": "Room 4"
                }),
                &ctx,
            )
            .await
            .unwrap();

        let path = dir.path().join("team-sync-weekly.ics");
        assert_eq!(out["file"], path.display().to_string());
        let ics = std::fs::read_to_string(path).unwrap();
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.contains("DTSTART:20250314T150000\r\n"));
        assert!(ics.contains("DTEND:20250314T160000\r\n"));
        assert!(ics.contains("SUMMARY:Team Sync\\, weekly\r\n"));
        assert!(ics.contains("LOCATION:Room 4\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }

    #[tokio::test]
    async fn utc_times_keep_zulu_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        CreateCalendarEvent
            .execute(
                json!({
                    "title": "Launch",
                    "start": "2025-01-01T10:00:00+02:00",
                    "end": "2025-01-01T11:30:00+02:00",
                    "path": "launch.ics"
                }),
                &ctx,
            )
            .await
            .unwrap();

        let ics = std::fs::read_to_string(dir.path().join("launch.ics")).unwrap();
        assert!(ics.contains("DTSTART:20250101T080000Z"));
        assert!(ics.contains("DTEND:20250101T093000Z"));
    }

    #[tokio::test]
    async fn rejects_end_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let err = CreateCalendarEvent
            .execute(
                json!({"title": "x", "start": "2025-01-02T10:00", "end": "2025-01-02T09:00"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::InvalidInput("end must be after start".into()));
    }

    #[tokio::test]
    async fn rejects_unparseable_start() {
        let ctx = ToolContext::new(".");
        let err = CreateCalendarEvent
            .execute(json!({"title": "x", "start": "next tuesday"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[test]
    fn escapes_text_values() {
        assert_eq!(escape("a;b,c\\d\ne"), "a\\;b\\,c\\\\d\\ne");
    }

    #[test]
    fn slug_falls_back() {
        assert_eq!(slug("!!!"), "event");
        assert_eq!(slug("Dentist @ 3pm"), "dentist-3pm");
    }
}
