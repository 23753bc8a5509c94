//! Call summary extraction.
//!
//! Every summary field is described by one `FieldRule`: where to read it in the record, what to
//! use when it is missing, and whether it is a timestamp to localize. Only the call identifier has
//! no default; its absence is the single fatal outcome of extraction.

use crate::constants::{
    CALL_SUMMARY_NODE, DEFAULT_AGENT_NAME, ORGANIZATION_PARAMETER, UNKNOWN, VOICEMAIL_LAST_NAME,
};
use crate::display_time::to_display_time_in;
use crate::record::{CallRecord, XmlElement};
use crate::{PipelineError, PipelineResult};
use callmeta_types::NonEmptyText;
use chrono_tz::Tz;

/// Flat, always-populated summary of one call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub call_guid: NonEmptyText,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub agent_name: NonEmptyText,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub agent_extension: NonEmptyText,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub call_direction: NonEmptyText,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub caller_number: NonEmptyText,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub organization: NonEmptyText,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub start_time: NonEmptyText,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub end_time: NonEmptyText,
}

impl CallSummary {
    /// `(node name, value)` pairs in injection order.
    pub fn entries(&self) -> [(&'static str, &str); 8] {
        [
            ("callGuid", self.call_guid.as_str()),
            ("agentName", self.agent_name.as_str()),
            ("agentExtension", self.agent_extension.as_str()),
            ("callDirection", self.call_direction.as_str()),
            ("callerNumber", self.caller_number.as_str()),
            ("organization", self.organization.as_str()),
            ("startTime", self.start_time.as_str()),
            ("endTime", self.end_time.as_str()),
        ]
    }

    /// The `callSummary` element injected into the record.
    pub fn to_element(&self) -> XmlElement {
        let mut node = XmlElement::new(CALL_SUMMARY_NODE);
        for (name, value) in self.entries() {
            node.push_child(XmlElement::with_text(name, value));
        }
        node
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    CallGuid,
    AgentName,
    AgentExtension,
    CallDirection,
    CallerNumber,
    Organization,
    StartTime,
    EndTime,
}

const FIELD_COUNT: usize = 8;

/// How one summary field is read.
struct FieldRule {
    field: Field,
    read: fn(&XmlElement) -> Option<String>,
    /// `None` marks a required field.
    default: Option<&'static str>,
    localize: bool,
}

const RULES: [FieldRule; FIELD_COUNT] = [
    FieldRule {
        field: Field::CallGuid,
        read: call_guid,
        default: None,
        localize: false,
    },
    FieldRule {
        field: Field::AgentName,
        read: agent_name,
        default: Some(DEFAULT_AGENT_NAME),
        localize: false,
    },
    FieldRule {
        field: Field::AgentExtension,
        read: agent_extension,
        default: Some(UNKNOWN),
        localize: false,
    },
    FieldRule {
        field: Field::CallDirection,
        read: call_direction,
        default: Some(UNKNOWN),
        localize: false,
    },
    FieldRule {
        field: Field::CallerNumber,
        read: caller_number,
        default: Some(UNKNOWN),
        localize: false,
    },
    FieldRule {
        field: Field::Organization,
        read: organization,
        default: Some(UNKNOWN),
        localize: false,
    },
    FieldRule {
        field: Field::StartTime,
        read: start_time,
        default: Some(UNKNOWN),
        localize: true,
    },
    FieldRule {
        field: Field::EndTime,
        read: end_time,
        default: Some(UNKNOWN),
        localize: true,
    },
];

fn root_text(root: &XmlElement, name: &str) -> Option<String> {
    root.child_text(name).map(str::to_owned)
}

fn call_guid(root: &XmlElement) -> Option<String> {
    root_text(root, "id")
}

fn call_direction(root: &XmlElement) -> Option<String> {
    root_text(root, "direction")
}

fn caller_number(root: &XmlElement) -> Option<String> {
    root_text(root, "callerNumber")
}

fn start_time(root: &XmlElement) -> Option<String> {
    root_text(root, "starttime")
}

fn end_time(root: &XmlElement) -> Option<String> {
    root_text(root, "endtime")
}

/// First employee, anywhere in the record, with a `lastName` that is not a voicemail box.
fn agent(root: &XmlElement) -> Option<&XmlElement> {
    root.descendants().find(|e| {
        e.local_name() == "employee"
            && e.child("lastName")
                .is_some_and(|last| last.text() != Some(VOICEMAIL_LAST_NAME))
    })
}

fn agent_name(root: &XmlElement) -> Option<String> {
    let employee = agent(root)?;
    let first = employee.child("firstName");
    let last = employee.child("lastName");
    if first.is_none() && last.is_none() {
        return None;
    }

    fn part(node: Option<&XmlElement>) -> &str {
        node.and_then(XmlElement::text).unwrap_or_default()
    }
    Some(format!("{} {}", part(first), part(last)))
}

fn agent_extension(root: &XmlElement) -> Option<String> {
    agent(root)?.child_text("phoneNumber").map(str::to_owned)
}

fn organization(root: &XmlElement) -> Option<String> {
    root.descendants()
        .find(|e| {
            e.local_name() == "conversationParameters"
                && e.child_text("name") == Some(ORGANIZATION_PARAMETER)
        })?
        .child_text("parameterValue")
        .map(str::to_owned)
}

/// Derives [`CallSummary`] values from call records.
#[derive(Debug, Clone, Copy)]
pub struct FieldExtractor {
    timezone: Tz,
}

impl FieldExtractor {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// # Errors
    ///
    /// `PipelineError::InvalidConfig` if `timezone` is not a known IANA zone.
    pub fn for_timezone(timezone: &str) -> PipelineResult<Self> {
        timezone
            .trim()
            .parse::<Tz>()
            .map(Self::new)
            .map_err(|_| PipelineError::InvalidConfig(format!("unknown timezone '{timezone}'")))
    }

    /// Read the summary out of `record`.
    ///
    /// # Errors
    ///
    /// `PipelineError::MissingCallGuid` if the root has no non-blank `id` child. Every other
    /// field falls back to its default.
    pub fn extract(&self, record: &CallRecord) -> PipelineResult<CallSummary> {
        let root = record.root();
        let mut values: [Option<NonEmptyText>; FIELD_COUNT] = Default::default();

        for rule in &RULES {
            let raw = (rule.read)(root).filter(|text| !text.trim().is_empty());
            let raw = match (raw, rule.default) {
                (Some(text), _) => text,
                (None, Some(default)) => default.to_owned(),
                (None, None) => return Err(PipelineError::MissingCallGuid),
            };

            let value = if rule.localize {
                to_display_time_in(&raw, self.timezone)
            } else {
                raw
            };

            tracing::debug!(field = ?rule.field, value = %value, "extracted summary field");
            values[rule.field as usize] = Some(NonEmptyText::or_default(
                Some(&value),
                rule.default.unwrap_or(UNKNOWN),
            ));
        }

        let mut take = |field: Field| {
            values[field as usize]
                .take()
                .unwrap_or_else(|| NonEmptyText::from_static(UNKNOWN))
        };

        Ok(CallSummary {
            call_guid: take(Field::CallGuid),
            agent_name: take(Field::AgentName),
            agent_extension: take(Field::AgentExtension),
            call_direction: take(Field::CallDirection),
            caller_number: take(Field::CallerNumber),
            organization: take(Field::Organization),
            start_time: take(Field::StartTime),
            end_time: take(Field::EndTime),
        })
    }

    /// Extract the summary and inject it into `record` as its `callSummary` child.
    pub fn summarize(&self, record: &mut CallRecord) -> PipelineResult<CallSummary> {
        let summary = self.extract(record)?;
        inject_summary(record, &summary);
        Ok(summary)
    }
}

/// Attach `summary` to the record root, replacing any earlier `callSummary` node.
pub fn inject_summary(record: &mut CallRecord, summary: &CallSummary) {
    let root = record.root_mut();
    root.remove_children(CALL_SUMMARY_NODE);
    root.push_child(summary.to_element());
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"<recording>
  <id>3f2c-77aa</id>
  <direction>Inbound</direction>
  <callerNumber>15551234567</callerNumber>
  <starttime>2023-07-04T16:30:00Z</starttime>
  <endtime>2023-07-04T16:42:10Z</endtime>
  <participants>
    <employee><firstName>Voice</firstName><lastName>Voicemail</lastName><phoneNumber>999</phoneNumber></employee>
    <employee><firstName>Grace</firstName><lastName>Hopper</lastName><phoneNumber>4021</phoneNumber></employee>
  </participants>
  <conversationParameters><name>Queue</name><parameterValue>Sales</parameterValue></conversationParameters>
  <conversationParameters><name>Organization</name><parameterValue>Acme, Inc.</parameterValue></conversationParameters>
</recording>"#;

    fn extractor() -> FieldExtractor {
        FieldExtractor::new(chrono_tz::America::New_York)
    }

    fn parse(xml: &str) -> CallRecord {
        CallRecord::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn extracts_every_field_from_complete_record() {
        let summary = extractor().extract(&parse(FULL)).unwrap();

        assert_eq!(summary.call_guid.as_str(), "3f2c-77aa");
        assert_eq!(summary.agent_name.as_str(), "Grace Hopper");
        assert_eq!(summary.agent_extension.as_str(), "4021");
        assert_eq!(summary.call_direction.as_str(), "Inbound");
        assert_eq!(summary.caller_number.as_str(), "15551234567");
        assert_eq!(summary.organization.as_str(), "Acme, Inc.");
        assert_eq!(summary.start_time.as_str(), "2023-07-04 12:30:00 EDT");
        assert_eq!(summary.end_time.as_str(), "2023-07-04 12:42:10 EDT");
    }

    #[test]
    fn sparse_record_gets_documented_defaults() {
        let summary = extractor()
            .extract(&parse("<recording><id>g1</id></recording>"))
            .unwrap();

        assert_eq!(summary.call_guid.as_str(), "g1");
        assert_eq!(summary.agent_name.as_str(), "Agent");
        for value in [
            &summary.agent_extension,
            &summary.call_direction,
            &summary.caller_number,
            &summary.organization,
            &summary.start_time,
            &summary.end_time,
        ] {
            assert_eq!(value.as_str(), "Unknown");
        }
    }

    #[test]
    fn missing_or_blank_guid_is_fatal() {
        for xml in [
            "<recording><direction>Inbound</direction></recording>",
            "<recording><id>   </id></recording>",
            "<recording><id/></recording>",
        ] {
            assert!(matches!(
                extractor().extract(&parse(xml)),
                Err(PipelineError::MissingCallGuid)
            ));
        }
    }

    #[test]
    fn agent_name_uses_present_parts_only() {
        let only_last =
            "<r><id>g</id><employee><lastName>Torvalds</lastName><phoneNumber>7</phoneNumber></employee></r>";
        let summary = extractor().extract(&parse(only_last)).unwrap();
        assert_eq!(summary.agent_name.as_str(), "Torvalds");
        assert_eq!(summary.agent_extension.as_str(), "7");

        let empty_last =
            "<r><id>g</id><employee><firstName>Linus</firstName><lastName/></employee></r>";
        let summary = extractor().extract(&parse(empty_last)).unwrap();
        assert_eq!(summary.agent_name.as_str(), "Linus");
    }

    #[test]
    fn employee_without_last_name_is_not_the_agent() {
        let xml = "<r><id>g</id>\
            <employee><firstName>Bob</firstName><phoneNumber>1</phoneNumber></employee>\
            <employee><firstName>Grace</firstName><lastName>Hopper</lastName><phoneNumber>4021</phoneNumber></employee>\
            </r>";
        let summary = extractor().extract(&parse(xml)).unwrap();
        assert_eq!(summary.agent_name.as_str(), "Grace Hopper");
        assert_eq!(summary.agent_extension.as_str(), "4021");

        let lone = "<r><id>g</id><employee><firstName>Bob</firstName><phoneNumber>1</phoneNumber></employee></r>";
        let summary = extractor().extract(&parse(lone)).unwrap();
        assert_eq!(summary.agent_name.as_str(), "Agent");
        assert_eq!(summary.agent_extension.as_str(), "Unknown");
    }

    #[test]
    fn only_voicemail_employees_means_default_agent() {
        let xml = "<r><id>g</id><employee><firstName>Box</firstName><lastName>Voicemail</lastName><phoneNumber>1</phoneNumber></employee></r>";
        let summary = extractor().extract(&parse(xml)).unwrap();

        assert_eq!(summary.agent_name.as_str(), "Agent");
        assert_eq!(summary.agent_extension.as_str(), "Unknown");
    }

    #[test]
    fn organization_without_value_defaults() {
        let xml = "<r><id>g</id><conversationParameters><name>Organization</name></conversationParameters></r>";
        let summary = extractor().extract(&parse(xml)).unwrap();
        assert_eq!(summary.organization.as_str(), "Unknown");
    }

    #[test]
    fn timezone_names_are_validated() {
        assert!(FieldExtractor::for_timezone("Europe/London").is_ok());
        assert!(matches!(
            FieldExtractor::for_timezone("Nowhere/Special"),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn bad_timestamp_falls_back_to_unknown() {
        let xml = "<r><id>g</id><starttime>not-a-time</starttime></r>";
        let summary = extractor().extract(&parse(xml)).unwrap();
        assert_eq!(summary.start_time.as_str(), "Unknown");
    }

    #[test]
    fn summarize_injects_and_replaces_call_summary() {
        let mut record = parse(FULL);
        let extractor = extractor();

        extractor.summarize(&mut record).unwrap();
        extractor.summarize(&mut record).unwrap();

        let summaries: Vec<_> = record
            .root()
            .children()
            .iter()
            .filter(|c| c.name() == CALL_SUMMARY_NODE)
            .collect();
        assert_eq!(summaries.len(), 1);

        let names: Vec<_> = summaries[0].children().iter().map(XmlElement::name).collect();
        assert_eq!(
            names,
            vec![
                "callGuid",
                "agentName",
                "agentExtension",
                "callDirection",
                "callerNumber",
                "organization",
                "startTime",
                "endTime"
            ]
        );
        assert_eq!(summaries[0].child_text("agentName"), Some("Grace Hopper"));
    }

    #[test]
    fn summary_serializes_camel_case() {
        let summary = extractor()
            .extract(&parse("<recording><id>g1</id></recording>"))
            .unwrap();
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["callGuid"], "g1");
        assert_eq!(json["agentName"], "Agent");
        assert_eq!(json["endTime"], "Unknown");
    }
}
