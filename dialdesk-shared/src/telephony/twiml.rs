/// Call instruction documents
///
/// A small builder for the provider's XML verbs, written out with
/// `quick_xml`. Only the verbs DialDesk uses are modeled. Characters XML
/// cannot carry (control characters other than tab and newlines) are
/// dropped from text and attribute values.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Failed to render call instructions: {0}")]
pub struct RenderError(String);

#[derive(Debug, Clone, PartialEq)]
enum DialTarget {
    Number(String),
    Client(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dial {
    caller_id: Option<String>,
    record: bool,
    timeout_secs: Option<u32>,
    action: Option<String>,
    recording_callback: Option<String>,
    targets: Vec<DialTarget>,
}

impl Dial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn caller_id(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    /// Records both legs; the recording is reported to `callback`
    pub fn record(mut self, callback: impl Into<String>) -> Self {
        self.record = true;
        self.recording_callback = Some(callback.into());
        self
    }

    pub fn timeout(mut self, secs: u32) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// URL requested when the dial ends; its response continues the call
    pub fn action(mut self, url: impl Into<String>) -> Self {
        self.action = Some(url.into());
        self
    }

    pub fn number(mut self, number: impl Into<String>) -> Self {
        self.targets.push(DialTarget::Number(number.into()));
        self
    }

    pub fn client(mut self, identity: impl Into<String>) -> Self {
        self.targets.push(DialTarget::Client(identity.into()));
        self
    }
}

/// Voicemail recording after the beep
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    max_length_secs: u32,
    action: Option<String>,
    recording_callback: Option<String>,
    transcribe_callback: Option<String>,
}

impl Record {
    pub fn new(max_length_secs: u32) -> Self {
        Record {
            max_length_secs,
            action: None,
            recording_callback: None,
            transcribe_callback: None,
        }
    }

    pub fn action(mut self, url: impl Into<String>) -> Self {
        self.action = Some(url.into());
        self
    }

    /// Where the finished recording is reported
    pub fn recording_callback(mut self, url: impl Into<String>) -> Self {
        self.recording_callback = Some(url.into());
        self
    }

    /// Requests a transcription, posted to `url` when ready
    pub fn transcribe(mut self, url: impl Into<String>) -> Self {
        self.transcribe_callback = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Verb {
    Say(String),
    Play(String),
    Pause(u32),
    Dial(Dial),
    Record(Record),
    Hangup,
}

/// Root `<Response>` document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say(text.into()));
        self
    }

    pub fn play(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Play(url.into()));
        self
    }

    pub fn pause(mut self, secs: u32) -> Self {
        self.verbs.push(Verb::Pause(secs));
        self
    }

    pub fn dial(mut self, dial: Dial) -> Self {
        self.verbs.push(Verb::Dial(dial));
        self
    }

    /// Shorthand for dialing a single browser client
    pub fn dial_client(self, identity: &str) -> Self {
        self.dial(Dial::new().client(identity))
    }

    pub fn record(mut self, record: Record) -> Self {
        self.verbs.push(Verb::Record(record));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    pub fn render(&self) -> Result<String, RenderError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        if self.verbs.is_empty() {
            write(&mut writer, Event::Empty(BytesStart::new("Response")))?;
        } else {
            write(&mut writer, Event::Start(BytesStart::new("Response")))?;
            for verb in &self.verbs {
                write_verb(&mut writer, verb)?;
            }
            write(&mut writer, Event::End(BytesEnd::new("Response")))?;
        }

        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| RenderError(e.to_string()))
    }
}

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn write(writer: &mut XmlWriter, event: Event<'_>) -> Result<(), RenderError> {
    writer
        .write_event(event)
        .map_err(|e| RenderError(e.to_string()))
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<(), RenderError> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(&xml_safe(text))))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn attr(element: &mut BytesStart<'_>, name: &str, value: &str) {
    element.push_attribute((name, xml_safe(value).as_ref()));
}

fn write_verb(writer: &mut XmlWriter, verb: &Verb) -> Result<(), RenderError> {
    match verb {
        Verb::Say(text) => text_element(writer, "Say", text),
        Verb::Play(url) => text_element(writer, "Play", url),
        Verb::Pause(secs) => {
            let mut pause = BytesStart::new("Pause");
            attr(&mut pause, "length", &secs.to_string());
            write(writer, Event::Empty(pause))
        }
        Verb::Hangup => write(writer, Event::Empty(BytesStart::new("Hangup"))),
        Verb::Record(record) => {
            let mut element = BytesStart::new("Record");
            if let Some(action) = &record.action {
                attr(&mut element, "action", action);
            }
            attr(&mut element, "maxLength", &record.max_length_secs.to_string());
            attr(&mut element, "playBeep", "true");
            if let Some(callback) = &record.recording_callback {
                attr(&mut element, "recordingStatusCallback", callback);
            }
            if let Some(callback) = &record.transcribe_callback {
                attr(&mut element, "transcribe", "true");
                attr(&mut element, "transcribeCallback", callback);
            }
            write(writer, Event::Empty(element))
        }
        Verb::Dial(dial) => {
            let mut element = BytesStart::new("Dial");
            if let Some(caller_id) = &dial.caller_id {
                attr(&mut element, "callerId", caller_id);
            }
            if let Some(secs) = dial.timeout_secs {
                attr(&mut element, "timeout", &secs.to_string());
            }
            if let Some(action) = &dial.action {
                attr(&mut element, "action", action);
            }
            if dial.record {
                attr(&mut element, "record", "record-from-answer-dual");
            }
            if let Some(callback) = &dial.recording_callback {
                attr(&mut element, "recordingStatusCallback", callback);
            }

            write(writer, Event::Start(element))?;
            for target in &dial.targets {
                match target {
                    DialTarget::Number(n) => text_element(writer, "Number", n)?,
                    DialTarget::Client(c) => text_element(writer, "Client", c)?,
                }
            }
            write(writer, Event::End(BytesEnd::new("Dial")))
        }
    }
}

/// Drops characters XML 1.0 cannot carry
fn xml_safe(value: &str) -> Cow<'_, str> {
    fn allowed(c: char) -> bool {
        !c.is_control() || matches!(c, '\t' | '\n' | '\r')
    }

    if value.chars().all(allowed) {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(value.chars().filter(|&c| allowed(c)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

    #[test]
    fn test_empty_response() {
        assert_eq!(
            VoiceResponse::new().render().unwrap(),
            format!("{HEADER}<Response/>")
        );
    }

    #[test]
    fn test_dial_with_options() {
        let xml = VoiceResponse::new()
            .dial(
                Dial::new()
                    .caller_id("+15550001111")
                    .timeout(20)
                    .record("https://x/rec")
                    .number("+15550002222"),
            )
            .render()
            .unwrap();

        assert_eq!(
            xml,
            format!(
                "{HEADER}<Response><Dial callerId=\"+15550001111\" timeout=\"20\" \
                 record=\"record-from-answer-dual\" recordingStatusCallback=\"https://x/rec\">\
                 <Number>+15550002222</Number></Dial></Response>"
            )
        );
    }

    #[test]
    fn test_ring_agents_then_voicemail() {
        let xml = VoiceResponse::new()
            .dial(Dial::new().client("agent_a").client("agent_b").timeout(25))
            .say("Please leave a message.")
            .record(
                Record::new(120)
                    .recording_callback("https://x/vm")
                    .transcribe("https://x/tx"),
            )
            .hangup()
            .render()
            .unwrap();

        assert!(xml.contains("<Client>agent_a</Client><Client>agent_b</Client>"));
        assert!(xml.contains(
            r#"<Record maxLength="120" playBeep="true" recordingStatusCallback="https://x/vm" transcribe="true" transcribeCallback="https://x/tx"/>"#
        ));
        assert!(xml.ends_with("<Hangup/></Response>"));
    }

    #[test]
    fn test_record_without_transcription() {
        let xml = VoiceResponse::new().record(Record::new(30)).render().unwrap();

        assert!(xml.contains(r#"<Record maxLength="30" playBeep="true"/>"#));
        assert!(!xml.contains("transcribe"));
    }

    #[test]
    fn test_escaping() {
        let xml = VoiceResponse::new()
            .say("Tom & Jerry <3")
            .play("https://x/a.mp3?a=1&b=\"2\"")
            .render()
            .unwrap();

        assert!(xml.contains("<Say>Tom &amp; Jerry &lt;3</Say>"));
        assert!(xml.contains("<Play>https://x/a.mp3?a=1&amp;b=&quot;2&quot;</Play>"));
    }

    #[test]
    fn test_control_characters_dropped() {
        let xml = VoiceResponse::new()
            .say("bell\u{7} and\tnull\u{0}")
            .dial(Dial::new().caller_id("+1555\u{1b}0001111").number("+15550002222"))
            .render()
            .unwrap();

        assert!(xml.contains("<Say>bell and\tnull</Say>"));
        assert!(xml.contains(r#"callerId="+15550001111""#));
        assert!(!xml.chars().any(|c| c.is_control() && c != '\t'));
    }
}
