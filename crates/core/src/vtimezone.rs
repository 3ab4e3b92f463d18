//! VTIMEZONE rule model
//!
//! Only the parts of a VTIMEZONE block needed to compute offset transitions
//! are read: the STANDARD/DAYLIGHT observances with their DTSTART,
//! TZOFFSETFROM, TZOFFSETTO, TZNAME, RRULE and RDATE properties. Recurrence
//! rules are interpreted by the `rrule` crate.
//!
//! Observance DTSTART/RDATE values are local wall-clock times in the
//! observance's TZOFFSETFROM. Recurrences are evaluated in that local frame
//! (fed to `rrule` as if it were UTC, which keeps wall-clock arithmetic free
//! of DST gaps) and shifted back to UTC afterwards.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone as _, Utc};
use rrule::{RRuleSet, Tz};

const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";

/// A UTC offset with second precision.
///
/// Displays as `±HH:MM`, or `±HH:MM:SS` when seconds are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtcOffset(i32);

impl UtcOffset {
    /// Build from total seconds east of UTC
    #[must_use]
    pub fn from_seconds(seconds: i32) -> Self {
        Self(seconds)
    }

    /// Parse the RFC 5545 form `+HHMM` / `-HHMMSS`
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (sign, digits) = match value.as_bytes().first()? {
            b'+' => (1, &value[1..]),
            b'-' => (-1, &value[1..]),
            _ => return None,
        };
        if !(digits.len() == 4 || digits.len() == 6) || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        let hours: i32 = digits[0..2].parse().ok()?;
        let minutes: i32 = digits[2..4].parse().ok()?;
        let seconds: i32 = if digits.len() == 6 {
            digits[4..6].parse().ok()?
        } else {
            0
        };
        if minutes > 59 || seconds > 59 {
            return None;
        }

        Some(Self(sign * (hours * 3600 + minutes * 60 + seconds)))
    }

    /// Total seconds east of UTC
    #[must_use]
    pub fn seconds(&self) -> i32 {
        self.0
    }

    /// The offset as a signed duration
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::seconds(i64::from(self.0))
    }
}

impl fmt::Display for UtcOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { '-' } else { '+' };
        let total = self.0.unsigned_abs();
        let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
        if seconds == 0 {
            write!(f, "{sign}{hours:02}:{minutes:02}")
        } else {
            write!(f, "{sign}{hours:02}:{minutes:02}:{seconds:02}")
        }
    }
}

/// STANDARD or DAYLIGHT sub-component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservanceKind {
    Standard,
    Daylight,
}

impl ObservanceKind {
    fn from_component(name: &str) -> Option<Self> {
        match name {
            "STANDARD" => Some(Self::Standard),
            "DAYLIGHT" => Some(Self::Daylight),
            _ => None,
        }
    }

    /// Component name as written in the definition
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Daylight => "DAYLIGHT",
        }
    }
}

/// One observance of a zone and the rules for when it begins.
#[derive(Debug, Clone)]
pub struct ObservanceRule {
    pub kind: ObservanceKind,
    /// TZNAME, if present
    pub tz_name: Option<String>,
    /// First onset, local wall-clock time
    pub dtstart: NaiveDateTime,
    pub offset_from: UtcOffset,
    pub offset_to: UtcOffset,
    recurrence: Option<RRuleSet>,
    rdates: Vec<NaiveDateTime>,
}

/// One offset transition produced by an observance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub name: String,
    /// Local wall-clock onset (in the offset before the transition)
    pub onset_local: NaiveDateTime,
    pub onset_utc: DateTime<Utc>,
    pub offset_from: UtcOffset,
    pub offset_to: UtcOffset,
}

impl ObservanceRule {
    /// Observance name: TZNAME, falling back to the component name
    #[must_use]
    pub fn name(&self) -> &str {
        self.tz_name.as_deref().unwrap_or(self.kind.as_str())
    }

    /// Whether this observance carries an RRULE
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Onsets (local wall-clock) within `[from, to)`, ascending.
    fn occurrences(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<NaiveDateTime>, String> {
        let in_range = |dt: &NaiveDateTime| *dt >= from && *dt < to;

        let mut out: Vec<NaiveDateTime> = Vec::new();
        if in_range(&self.dtstart) {
            out.push(self.dtstart);
        }
        out.extend(self.rdates.iter().copied().filter(in_range));

        if let Some(set) = &self.recurrence {
            if to > self.dtstart {
                let lower = from.max(self.dtstart) - Duration::seconds(1);
                let result = set
                    .clone()
                    .after(Tz::UTC.from_utc_datetime(&lower))
                    .before(Tz::UTC.from_utc_datetime(&to))
                    .all(u16::MAX);
                if result.limited {
                    tracing::warn!(
                        observance = self.name(),
                        "recurrence expansion hit the occurrence limit"
                    );
                }
                out.extend(
                    result
                        .dates
                        .iter()
                        .map(|dt| dt.naive_utc())
                        .filter(in_range),
                );
            }
        }

        out.sort();
        out.dedup();
        Ok(out)
    }

    fn transition(&self, onset_local: NaiveDateTime) -> Transition {
        Transition {
            name: self.name().to_string(),
            onset_local,
            onset_utc: (onset_local - self.offset_from.as_duration()).and_utc(),
            offset_from: self.offset_from,
            offset_to: self.offset_to,
        }
    }
}

/// Parsed rules of one zone.
#[derive(Debug, Clone)]
pub struct ZoneRules {
    tzid: Option<String>,
    observances: Vec<ObservanceRule>,
}

impl ZoneRules {
    /// Parse a VTIMEZONE block (optionally wrapped in a VCALENDAR).
    ///
    /// # Errors
    /// Returns a description of the first problem found.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut tzid = None;
        let mut observances = Vec::new();
        let mut in_zone = false;
        let mut seen_zone = false;
        let mut current: Option<ObservanceBuilder> = None;

        for line in unfold(text) {
            let Some((name, value)) = split_content_line(&line) else {
                continue;
            };

            match (name.as_str(), value) {
                ("BEGIN", "VTIMEZONE") if !seen_zone => {
                    in_zone = true;
                    seen_zone = true;
                }
                ("END", "VTIMEZONE") if in_zone => {
                    if current.is_some() {
                        return Err("VTIMEZONE ended inside an observance".to_string());
                    }
                    in_zone = false;
                }
                ("BEGIN", component) if in_zone => {
                    let kind = ObservanceKind::from_component(component)
                        .ok_or_else(|| format!("unexpected component {component}"))?;
                    if current.is_some() {
                        return Err(format!("nested {component}"));
                    }
                    current = Some(ObservanceBuilder::new(kind));
                }
                ("END", component) if in_zone => {
                    let builder = current
                        .take()
                        .ok_or_else(|| format!("END:{component} without BEGIN"))?;
                    if builder.kind.as_str() != component {
                        return Err(format!(
                            "END:{component} closes {}",
                            builder.kind.as_str()
                        ));
                    }
                    observances.push(builder.build()?);
                }
                (property, value) if in_zone => match current.as_mut() {
                    Some(builder) => builder.property(property, value)?,
                    None if property == "TZID" => tzid = Some(value.to_string()),
                    None => {}
                },
                _ => {}
            }
        }

        if !seen_zone {
            return Err("no VTIMEZONE component".to_string());
        }
        if in_zone {
            return Err("VTIMEZONE not terminated".to_string());
        }
        if observances.is_empty() {
            return Err("VTIMEZONE has no observances".to_string());
        }

        Ok(Self { tzid, observances })
    }

    /// TZID declared inside the block
    #[must_use]
    pub fn tzid(&self) -> Option<&str> {
        self.tzid.as_deref()
    }

    /// Observances in definition order
    #[must_use]
    pub fn observances(&self) -> &[ObservanceRule] {
        &self.observances
    }

    /// Transitions whose UTC onset lies in `[start, end)`, in discovery
    /// order: observance by observance, ascending within each.
    ///
    /// # Errors
    /// Returns an error if the recurrence library fails.
    pub fn transitions(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transition>, String> {
        let mut out = Vec::new();
        for observance in &self.observances {
            let shift = observance.offset_from.as_duration();
            let from = start.naive_utc() + shift;
            let to = end.naive_utc() + shift;
            for onset in observance.occurrences(from, to)? {
                out.push(observance.transition(onset));
            }
        }
        Ok(out)
    }

    /// UTC offset in effect at an instant.
    ///
    /// Before the first transition the earliest observance's TZOFFSETFROM
    /// applies.
    ///
    /// # Errors
    /// Returns an error if the recurrence library fails.
    pub fn offset_at(&self, instant: DateTime<Utc>) -> Result<UtcOffset, String> {
        let mut latest: Option<(DateTime<Utc>, UtcOffset)> = None;

        for observance in &self.observances {
            let shift = observance.offset_from.as_duration();
            let upper = instant.naive_utc() + shift + Duration::seconds(1);
            let Some(onset) = observance
                .occurrences(observance.dtstart, upper)?
                .last()
                .copied()
            else {
                continue;
            };
            let onset_utc = (onset - shift).and_utc();
            if latest.map_or(true, |(best, _)| onset_utc > best) {
                latest = Some((onset_utc, observance.offset_to));
            }
        }

        if let Some((_, offset)) = latest {
            return Ok(offset);
        }
        self.observances
            .iter()
            .min_by_key(|o| o.dtstart)
            .map(|o| o.offset_from)
            .ok_or_else(|| "zone has no observances".to_string())
    }

    /// Local wall-clock time for a UTC instant
    ///
    /// # Errors
    /// Returns an error if the recurrence library fails.
    pub fn to_local(&self, instant: DateTime<Utc>) -> Result<NaiveDateTime, String> {
        Ok(instant.naive_utc() + self.offset_at(instant)?.as_duration())
    }

    /// UTC instant for a local wall-clock time.
    ///
    /// Two passes: guess the offset treating the local time as UTC, then
    /// re-evaluate at the guessed instant. Ambiguous or skipped local times
    /// resolve to whichever offset the second pass lands on.
    ///
    /// # Errors
    /// Returns an error if the recurrence library fails.
    pub fn to_utc(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, String> {
        let guess = self.offset_at(local.and_utc())?;
        let first = (local - guess.as_duration()).and_utc();
        let offset = self.offset_at(first)?;
        Ok((local - offset.as_duration()).and_utc())
    }
}

struct ObservanceBuilder {
    kind: ObservanceKind,
    tz_name: Option<String>,
    dtstart: Option<NaiveDateTime>,
    offset_from: Option<UtcOffset>,
    offset_to: Option<UtcOffset>,
    rrules: Vec<String>,
    rdates: Vec<NaiveDateTime>,
}

impl ObservanceBuilder {
    fn new(kind: ObservanceKind) -> Self {
        Self {
            kind,
            tz_name: None,
            dtstart: None,
            offset_from: None,
            offset_to: None,
            rrules: Vec::new(),
            rdates: Vec::new(),
        }
    }

    fn property(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name {
            "DTSTART" => {
                self.dtstart =
                    Some(parse_local_value(value).ok_or_else(|| format!("bad DTSTART {value}"))?);
            }
            "TZOFFSETFROM" => {
                self.offset_from = Some(
                    UtcOffset::parse(value).ok_or_else(|| format!("bad TZOFFSETFROM {value}"))?,
                );
            }
            "TZOFFSETTO" => {
                self.offset_to = Some(
                    UtcOffset::parse(value).ok_or_else(|| format!("bad TZOFFSETTO {value}"))?,
                );
            }
            "TZNAME" => self.tz_name = Some(value.to_string()),
            "RRULE" => self.rrules.push(value.to_string()),
            "RDATE" => {
                for item in value.split(',') {
                    // PERIOD values: only the start matters for an onset
                    let start = item.split('/').next().unwrap_or(item);
                    self.rdates.push(
                        parse_local_value(start).ok_or_else(|| format!("bad RDATE {item}"))?,
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn build(self) -> Result<ObservanceRule, String> {
        let kind = self.kind.as_str();
        let dtstart = self.dtstart.ok_or_else(|| format!("{kind} without DTSTART"))?;
        let offset_from = self
            .offset_from
            .ok_or_else(|| format!("{kind} without TZOFFSETFROM"))?;
        let offset_to = self
            .offset_to
            .ok_or_else(|| format!("{kind} without TZOFFSETTO"))?;

        let recurrence = if self.rrules.is_empty() {
            None
        } else {
            let mut rule_text = format!("DTSTART:{}Z", dtstart.format(LOCAL_FORMAT));
            for rule in &self.rrules {
                rule_text.push_str("\nRRULE:");
                rule_text.push_str(&local_frame_rrule(rule, offset_from)?);
            }
            Some(RRuleSet::from_str(&rule_text).map_err(|e| format!("bad RRULE in {kind}: {e}"))?)
        };

        Ok(ObservanceRule {
            kind: self.kind,
            tz_name: self.tz_name,
            dtstart,
            offset_from,
            offset_to,
            recurrence,
            rdates: self.rdates,
        })
    }
}

/// Rewrite UNTIL into the observance's local frame so it compares against
/// local onsets. UTC values shift by TZOFFSETFROM; date-only values cover
/// the whole day.
fn local_frame_rrule(rule: &str, offset_from: UtcOffset) -> Result<String, String> {
    let parts: Result<Vec<String>, String> = rule
        .split(';')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let Some(until) = part.strip_prefix("UNTIL=") else {
                return Ok(part.to_string());
            };
            let local = if let Some(utc) = until.strip_suffix('Z') {
                NaiveDateTime::parse_from_str(utc, LOCAL_FORMAT)
                    .map(|dt| dt + offset_from.as_duration())
                    .map_err(|_| format!("bad UNTIL {until}"))?
            } else if until.len() == 8 {
                NaiveDate::parse_from_str(until, "%Y%m%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(23, 59, 59))
                    .ok_or_else(|| format!("bad UNTIL {until}"))?
            } else {
                NaiveDateTime::parse_from_str(until, LOCAL_FORMAT)
                    .map_err(|_| format!("bad UNTIL {until}"))?
            };
            Ok(format!("UNTIL={}Z", local.format(LOCAL_FORMAT)))
        })
        .collect();
    Ok(parts?.join(";"))
}

/// DATE-TIME or DATE value read as a local wall-clock time
fn parse_local_value(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(value, LOCAL_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y%m%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Undo RFC 5545 line folding
fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.lines() {
        let raw = raw.trim_end_matches('\r');
        if let Some(continuation) = raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
            if let Some(last) = lines.last_mut() {
                last.push_str(continuation);
                continue;
            }
        }
        if !raw.trim().is_empty() {
            lines.push(raw.to_string());
        }
    }
    lines
}

/// `NAME;PARAM=x:value` -> (`NAME`, `value`). Parameters are dropped.
fn split_content_line(line: &str) -> Option<(String, &str)> {
    let colon = line.find(':')?;
    let head = &line[..colon];
    let name = head.split(';').next().unwrap_or(head).trim();
    Some((name.to_ascii_uppercase(), line[colon + 1..].trim()))
}
