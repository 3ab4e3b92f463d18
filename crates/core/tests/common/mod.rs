//! Shared fixtures: zone definitions and zip archive builders

#![allow(dead_code)]

use std::fs::File;
use std::io::Write as _;
use std::path::Path;

use zip::write::SimpleFileOptions;

pub const NEW_YORK: &str = "BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VTIMEZONE
TZID:America/New_York
BEGIN:DAYLIGHT
TZOFFSETFROM:-0500
TZOFFSETTO:-0400
TZNAME:EDT
DTSTART:20070311T020000
RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU
END:DAYLIGHT
BEGIN:STANDARD
TZOFFSETFROM:-0400
TZOFFSETTO:-0500
TZNAME:EST
DTSTART:20071104T020000
RRULE:FREQ=YEARLY;BYMONTH=11;BYDAY=1SU
END:STANDARD
END:VTIMEZONE
END:VCALENDAR
";

/// A zone with a single fixed offset, e.g. `fixed_zone("Asia/Kolkata", "+0530")`
pub fn fixed_zone(id: &str, offset: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\nBEGIN:VTIMEZONE\nTZID:{id}\nBEGIN:STANDARD\nTZOFFSETFROM:{offset}\nTZOFFSETTO:{offset}\nDTSTART:19700101T000000\nEND:STANDARD\nEND:VTIMEZONE\nEND:VCALENDAR\n"
    )
}

/// Write a dataset archive with a manifest, an alias table and zones
pub fn write_archive(path: &Path, build_time: &str, aliases: &str, zones: &[(&str, String)]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    zip.start_file("info.txt", options).unwrap();
    writeln!(zip, "buildTime={build_time}").unwrap();

    zip.start_file("aliases.txt", options).unwrap();
    zip.write_all(aliases.as_bytes()).unwrap();

    for (id, definition) in zones {
        zip.start_file(format!("zoneinfo/{id}.ics"), options).unwrap();
        zip.write_all(definition.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// First dataset version: New York, Kolkata and one alias
pub fn write_v1(path: &Path) {
    write_archive(
        path,
        "2024-01-01T00:00:00Z",
        "US/Eastern=America/New_York\n",
        &[
            ("America/New_York", NEW_YORK.to_string()),
            ("Asia/Kolkata", fixed_zone("Asia/Kolkata", "+0530")),
        ],
    );
}

/// Second dataset version: Kolkata changed, Tokyo added, alias extended
pub fn write_v2(path: &Path) {
    write_archive(
        path,
        "2024-06-01T00:00:00",
        "US/Eastern=America/New_York\nJapan=Asia/Tokyo\n",
        &[
            ("America/New_York", NEW_YORK.to_string()),
            ("Asia/Kolkata", fixed_zone("Asia/Kolkata", "+0600")),
            ("Asia/Tokyo", fixed_zone("Asia/Tokyo", "+0900")),
        ],
    );
}
