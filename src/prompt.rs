use std::fmt::{self, Write};

use serde::Deserialize;

const COPYWRITER_INTRO: &str = "Hi, you are a very talented copywriter in the real estate field, and I need your help writing a beautiful listing description.";
const IMPROVE_REQUEST: &str = "Please improve this description by making it more engaging, structured, and detailed. ";
const IMPROVE_DETAILS_HEADER: &str =
    "Use the following additional property details to enhance the content:\n";
const IMPROVE_IMAGES_HEADER: &str =
    "These are the descriptions of the images that go with the real estate ad:\n";
const CREATE_REQUEST: &str = "Please create an engaging, structured, and appealing description of the property based on the following details:\n";
const CREATE_IMAGES_HEADER: &str = "These are the descriptions of the images that go with the real estate ad ( Use the image descriptions only to improve the real estate description without explicit indication ):\n";
const CLOSING_INSTRUCTION: &str = "\nAim for a response around 500 words, presented in a readable and attractive format. Always output only the description itself without any comments please!";

/// A structured listing attribute as sent by clients: either a JSON string or a JSON number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(serde_json::Number),
    Text(String),
}

impl AttributeValue {
    /// Empty strings and numeric zero count as "not provided".
    pub fn is_present(&self) -> bool {
        match self {
            AttributeValue::Number(number) => number.as_f64().is_some_and(|value| value != 0.0),
            AttributeValue::Text(text) => !text.is_empty(),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Number(number) => write!(f, "{number}"),
            AttributeValue::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingAttributes {
    pub rooms: Option<AttributeValue>,
    pub kitchen_area: Option<AttributeValue>,
    pub house_area: Option<AttributeValue>,
    pub floors: Option<AttributeValue>,
    pub property_type: Option<AttributeValue>,
}

impl ListingAttributes {
    /// Present attributes with their line templates, in prompt order.
    fn lines(&self) -> impl Iterator<Item = String> + '_ {
        [
            (&self.rooms, "Number of rooms", ""),
            (&self.kitchen_area, "Kitchen area", " m²"),
            (&self.house_area, "House area", " m²"),
            (&self.floors, "Number of floors", ""),
            // Clients send the location in `property_type`.
            (&self.property_type, "Location", ""),
        ]
        .into_iter()
        .filter_map(|(value, label, unit)| {
            value
                .as_ref()
                .filter(|value| value.is_present())
                .map(|value| format!("- {label}: {value}{unit}\n"))
        })
    }
}

/// Caption of the photo at 1-based position `index` in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCaption {
    pub index: usize,
    pub text: String,
}

impl fmt::Display for ImageCaption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image {}: {}", self.index, self.text)
    }
}

/// Builds the copywriting instruction sent to the chat model.
///
/// Pure and deterministic. A non-empty `description` selects the "improve"
/// template, otherwise the "create" template is used.
pub fn compose_prompt(
    description: Option<&str>,
    captions: &[ImageCaption],
    attributes: &ListingAttributes,
) -> String {
    let mut prompt = String::new();

    let images_header = match description.filter(|text| !text.is_empty()) {
        Some(description) => {
            let _ = write!(
                prompt,
                "{COPYWRITER_INTRO} Here is a property description:\n\n{description}\n\n"
            );
            prompt.push_str(IMPROVE_REQUEST);
            prompt.push_str(IMPROVE_DETAILS_HEADER);
            IMPROVE_IMAGES_HEADER
        }
        None => {
            prompt.push_str(COPYWRITER_INTRO);
            prompt.push('\n');
            prompt.push_str(CREATE_REQUEST);
            CREATE_IMAGES_HEADER
        }
    };

    if !captions.is_empty() {
        prompt.push_str(images_header);
        for caption in captions {
            let _ = writeln!(prompt, "- {caption}");
        }
    }

    for line in attributes.lines() {
        prompt.push_str(&line);
    }

    prompt.push_str(CLOSING_INSTRUCTION);
    prompt
}
