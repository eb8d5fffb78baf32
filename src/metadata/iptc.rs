//! Minimal IPTC-IIM reader for the Photoshop resource block (APP13) of JPEG files.

use std::collections::BTreeMap;

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP13: u8 = 0xED;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const RESOURCE_SIGNATURE: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;
const TAG_MARKER: u8 = 0x1C;

/// Application record, where the descriptive datasets live.
pub const APPLICATION_RECORD: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct IptcDataSet {
    pub record: u8,
    pub dataset: u8,
    pub value: String,
}

/// Reads every IIM dataset embedded in a JPEG. Anything that is not a JPEG,
/// or a truncated structure, yields what was read so far.
pub fn read_iptc(data: &[u8]) -> Vec<IptcDataSet> {
    find_iptc_block(data).map(parse_iim).unwrap_or_default()
}

/// Human readable name of an application record dataset.
pub fn dataset_name(dataset: u8) -> Option<&'static str> {
    let name = match dataset {
        5 => "Object Name",
        15 => "Category",
        25 => "Keywords",
        55 => "Date Created",
        80 => "By-line",
        90 => "City",
        92 => "Sub-location",
        101 => "Country/Primary Location Name",
        105 => "Headline",
        110 => "Credit",
        115 => "Source",
        116 => "Copyright Notice",
        120 => "Caption/Abstract",
        _ => return None,
    };
    Some(name)
}

/// Named application record values. Repeated datasets are joined with `;`.
pub fn to_tags(datasets: &[IptcDataSet]) -> BTreeMap<String, String> {
    let mut tags: BTreeMap<String, String> = BTreeMap::new();
    for set in datasets.iter().filter(|set| set.record == APPLICATION_RECORD) {
        let Some(name) = dataset_name(set.dataset) else {
            continue;
        };
        tags.entry(name.to_string())
            .and_modify(|value| {
                value.push(';');
                value.push_str(&set.value);
            })
            .or_insert_with(|| set.value.clone());
    }
    tags
}

fn find_iptc_block(data: &[u8]) -> Option<&[u8]> {
    if !data.starts_with(&SOI) {
        return None;
    }

    let mut pos = SOI.len();
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            SOS | EOI => return None,
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => {}
        }

        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let end = pos + 2 + length;
        if length < 2 || end > data.len() {
            return None;
        }
        if marker == APP13 {
            if let Some(block) = find_photoshop_iptc(&data[pos + 4..end]) {
                return Some(block);
            }
        }
        pos = end;
    }
    None
}

fn find_photoshop_iptc(segment: &[u8]) -> Option<&[u8]> {
    let mut rest = segment.strip_prefix(PHOTOSHOP_HEADER)?;

    while rest.len() >= 12 {
        if !rest.starts_with(RESOURCE_SIGNATURE) {
            return None;
        }
        let id = u16::from_be_bytes([rest[4], rest[5]]);

        // Pascal string name, padded to an even length.
        let mut name_len = 1 + rest[6] as usize;
        if name_len % 2 == 1 {
            name_len += 1;
        }
        let size_at = 6 + name_len;
        let size_bytes = rest.get(size_at..size_at + 4)?;
        let size = u32::from_be_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]])
            as usize;

        let start = size_at + 4;
        let end = start.checked_add(size)?;
        let block = rest.get(start..end)?;
        if id == IPTC_RESOURCE_ID {
            return Some(block);
        }

        let next = if size % 2 == 1 { end + 1 } else { end };
        rest = rest.get(next..)?;
    }
    None
}

fn parse_iim(block: &[u8]) -> Vec<IptcDataSet> {
    let mut datasets = Vec::new();
    let mut pos = 0;

    while pos + 5 <= block.len() && block[pos] == TAG_MARKER {
        let record = block[pos + 1];
        let dataset = block[pos + 2];
        let size = u16::from_be_bytes([block[pos + 3], block[pos + 4]]);
        // extended length datasets are not used for text fields
        if size & 0x8000 != 0 {
            break;
        }

        let start = pos + 5;
        let end = start + size as usize;
        let Some(value) = block.get(start..end) else {
            break;
        };
        datasets.push(IptcDataSet {
            record,
            dataset,
            value: String::from_utf8_lossy(value)
                .trim_end_matches('\0')
                .to_string(),
        });
        pos = end;
    }
    datasets
}
