//! Employee directory snapshot decoding
//!
//! The directory response lists its columns once in a `<fieldset>` and then
//! refers to them by id inside each `<employee>`. Field ids are resolved to
//! lowercased names after the whole document has been read, so the two
//! sections may appear in either order.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

use super::attribute;
use crate::api::{DirectoryRecord, DirectorySnapshot, Result};

struct RawEmployee {
    id: String,
    fields: Vec<(String, String)>,
}

struct OpenField {
    id: String,
    text: String,
}

pub fn parse_directory(body: &str) -> Result<DirectorySnapshot> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut field_names: HashMap<String, String> = HashMap::new();
    let mut employees: Vec<RawEmployee> = Vec::new();

    let mut fieldset_depth = 0usize;
    let mut employee: Option<RawEmployee> = None;
    let mut field: Option<OpenField> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"fieldset" => fieldset_depth += 1,
                b"field" if fieldset_depth > 0 => {
                    register_field_name(&mut field_names, &e)?;
                }
                b"field" if employee.is_some() => {
                    if let Some(id) = attribute(&e, b"id")? {
                        field = Some(OpenField {
                            id,
                            text: String::new(),
                        });
                    }
                }
                b"employee" if fieldset_depth == 0 => {
                    employee = Some(RawEmployee {
                        id: attribute(&e, b"id")?.unwrap_or_default().trim().to_string(),
                        fields: Vec::new(),
                    });
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"field" if fieldset_depth > 0 => {
                    register_field_name(&mut field_names, &e)?;
                }
                b"field" => {
                    if let (Some(current), Some(id)) = (employee.as_mut(), attribute(&e, b"id")?) {
                        current.fields.push((id, String::new()));
                    }
                }
                b"employee" if fieldset_depth == 0 => {
                    employees.push(RawEmployee {
                        id: attribute(&e, b"id")?.unwrap_or_default().trim().to_string(),
                        fields: Vec::new(),
                    });
                }
                _ => {}
            },
            Event::Text(e) => {
                if let Some(open) = field.as_mut() {
                    open.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(open) = field.as_mut() {
                    open.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"fieldset" => fieldset_depth = fieldset_depth.saturating_sub(1),
                b"field" => {
                    if let (Some(current), Some(open)) = (employee.as_mut(), field.take()) {
                        current.fields.push((open.id, open.text.trim().to_string()));
                    }
                }
                b"employee" => {
                    if let Some(done) = employee.take() {
                        employees.push(done);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let mut snapshot = DirectorySnapshot::with_capacity(employees.len());
    for raw in employees {
        if raw.id.is_empty() {
            continue;
        }

        let record: DirectoryRecord = raw
            .fields
            .into_iter()
            .map(|(id, value)| {
                let name = field_names.get(&id).cloned().unwrap_or(id);
                (name, value)
            })
            .collect();
        snapshot.insert(raw.id, record);
    }

    Ok(snapshot)
}

fn register_field_name(
    field_names: &mut HashMap<String, String>,
    e: &quick_xml::events::BytesStart<'_>,
) -> Result<()> {
    let id = attribute(e, b"id")?;
    let name = match attribute(e, b"name")? {
        Some(name) if !name.trim().is_empty() => Some(name),
        _ => attribute(e, b"title")?,
    };

    if let (Some(id), Some(name)) = (id, name) {
        let name = name.trim().to_lowercase();
        if !id.is_empty() && !name.is_empty() {
            field_names.insert(id, name);
        }
    }
    Ok(())
}
