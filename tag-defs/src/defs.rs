use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum DefsError {
    #[error("Tag meta [{0}] already exists in the project meta")]
    DuplicateTagMeta(String),

    #[error("Tag meta [{0}] is oneof_string but declares no possible values")]
    MissingPossibleValues(String),

    #[error("Tag meta [{name}] has value type {value_type} and cannot declare possible values")]
    UnexpectedPossibleValues { name: String, value_type: TagValueType },

    #[error("Value {value:?} is not a finite number, as tag meta [{name}] requires")]
    InvalidNumber { name: String, value: String },

    #[error("Tag meta [{0}] has value type none and takes no value")]
    UnexpectedValue(String),

    #[error("Invalid frame range [{start}, {end}]: start is after end")]
    InvalidFrameRange { start: u32, end: u32 },

    #[error("Malformed project meta: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagValueType {
    None,
    AnyNumber,
    AnyString,
    OneofString,
}

impl std::fmt::Display for TagValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TagValueType::None => "none",
            TagValueType::AnyNumber => "any_number",
            TagValueType::AnyString => "any_string",
            TagValueType::OneofString => "oneof_string",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for TagValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(TagValueType::None),
            "any_number" => Ok(TagValueType::AnyNumber),
            "any_string" => Ok(TagValueType::AnyString),
            "oneof_string" => Ok(TagValueType::OneofString),
            other => Err(format!("unknown tag value type: {}", other)),
        }
    }
}

/// Which entities a tag meta may be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TagApplicableTo {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "imagesOnly")]
    ImagesOnly,
    #[serde(rename = "objectsOnly")]
    ObjectsOnly,
}

impl std::str::FromStr for TagApplicableTo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(TagApplicableTo::All),
            "imagesOnly" | "images_only" => Ok(TagApplicableTo::ImagesOnly),
            "objectsOnly" | "objects_only" => Ok(TagApplicableTo::ObjectsOnly),
            other => Err(format!("unknown tag scope: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Number(f64),
    Text(String),
}

// Whole numbers go out as JSON integers (`3`, not `3.0`).
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

impl Serialize for TagValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TagValue::Number(number) if number.fract() == 0.0 && number.abs() <= MAX_EXACT_INTEGER => {
                serializer.serialize_i64(*number as i64)
            }
            TagValue::Number(number) => serializer.serialize_f64(*number),
            TagValue::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Number(value)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        TagValue::Number(value as f64)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Text(value.to_string())
    }
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagValue::Number(number) => write!(f, "{}", number),
            TagValue::Text(text) => write!(f, "{:?}", text),
        }
    }
}

/// Inclusive `[start, end]` frame span, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[u32; 2]", into = "[u32; 2]")]
pub struct FrameRange {
    start: u32,
    end: u32,
}

impl FrameRange {
    pub fn new(start: u32, end: u32) -> Result<Self, DefsError> {
        if start > end {
            return Err(DefsError::InvalidFrameRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn contains(&self, frame: u32) -> bool {
        self.start <= frame && frame <= self.end
    }
}

impl TryFrom<[u32; 2]> for FrameRange {
    type Error = DefsError;

    fn try_from(pair: [u32; 2]) -> Result<Self, Self::Error> {
        FrameRange::new(pair[0], pair[1])
    }
}

impl From<FrameRange> for [u32; 2] {
    fn from(range: FrameRange) -> Self {
        [range.start, range.end]
    }
}

impl std::fmt::Display for FrameRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagMeta {
    pub name: String,
    pub value_type: TagValueType,
    #[serde(rename = "values", default, skip_serializing_if = "Vec::is_empty")]
    pub possible_values: Vec<String>,
    #[serde(default)]
    pub color: String,
    #[serde(rename = "applicable_type", default)]
    pub applicable_to: TagApplicableTo,
    #[serde(rename = "classes", default)]
    pub applicable_classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    // Server fields we do not model (hotkey, target_type, ...) must round-trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TagMeta {
    pub fn new(name: impl Into<String>, value_type: TagValueType) -> Self {
        let name = name.into();
        let color = color_for_name(&name);
        Self {
            name,
            value_type,
            possible_values: Vec::new(),
            color,
            applicable_to: TagApplicableTo::All,
            applicable_classes: Vec::new(),
            id: None,
            extra: Map::new(),
        }
    }

    pub fn with_applicable_to(mut self, applicable_to: TagApplicableTo) -> Self {
        self.applicable_to = applicable_to;
        self
    }

    pub fn with_possible_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.possible_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Server-assigned id; `None` until the meta has been pushed and re-fetched.
    pub fn sly_id(&self) -> Option<i64> {
        self.id
    }

    pub fn validate(&self) -> Result<(), DefsError> {
        match self.value_type {
            TagValueType::OneofString if self.possible_values.is_empty() => {
                Err(DefsError::MissingPossibleValues(self.name.clone()))
            }
            TagValueType::OneofString => Ok(()),
            value_type if !self.possible_values.is_empty() => Err(DefsError::UnexpectedPossibleValues {
                name: self.name.clone(),
                value_type,
            }),
            _ => Ok(()),
        }
    }

    pub fn is_valid_value(&self, value: Option<&TagValue>) -> bool {
        match (self.value_type, value) {
            (TagValueType::None, None) => true,
            (TagValueType::AnyNumber, Some(TagValue::Number(_))) => true,
            (TagValueType::AnyString, Some(TagValue::Text(_))) => true,
            (TagValueType::OneofString, Some(TagValue::Text(text))) => {
                self.possible_values.iter().any(|allowed| allowed == text)
            }
            _ => false,
        }
    }

    /// Reads a raw command-line value the way this meta's value type expects it.
    pub fn parse_value(&self, raw: &str) -> Result<TagValue, DefsError> {
        match self.value_type {
            TagValueType::AnyNumber => match raw.trim().parse::<f64>() {
                Ok(number) if number.is_finite() => Ok(TagValue::Number(number)),
                _ => Err(DefsError::InvalidNumber {
                    name: self.name.clone(),
                    value: raw.to_string(),
                }),
            },
            TagValueType::AnyString | TagValueType::OneofString => Ok(TagValue::Text(raw.to_string())),
            TagValueType::None => Err(DefsError::UnexpectedValue(self.name.clone())),
        }
    }

    pub fn sorted_possible_values(&self) -> Vec<String> {
        let mut values = self.possible_values.clone();
        values.sort();
        values
    }
}

/// Deterministic `#RRGGBB` color for a tag name (FNV-1a over the bytes).
pub fn color_for_name(name: &str) -> String {
    let mut hash: u32 = 0x811c9dc5;
    for byte in name.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    format!("#{:06X}", hash & 0x00FF_FFFF)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjClass {
    pub title: String,
    #[serde(default)]
    pub shape: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Project schema: object classes and tag metas.
///
/// Writes replace the whole schema on the server, so every unknown field is
/// carried through `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMeta {
    #[serde(rename = "classes", default)]
    pub obj_classes: Vec<ObjClass>,
    #[serde(rename = "tags", default)]
    pub tag_metas: Vec<TagMeta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectMeta {
    pub fn from_json(data: &Value) -> Result<Self, DefsError> {
        Ok(serde_json::from_value(data.clone())?)
    }

    pub fn to_json(&self) -> Result<Value, DefsError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn has_tag_meta(&self, name: &str) -> bool {
        self.get_tag_meta(name).is_some()
    }

    pub fn get_tag_meta(&self, name: &str) -> Option<&TagMeta> {
        self.tag_metas.iter().find(|tag_meta| tag_meta.name == name)
    }

    pub fn get_tag_meta_by_id(&self, id: i64) -> Option<&TagMeta> {
        self.tag_metas.iter().find(|tag_meta| tag_meta.id == Some(id))
    }

    pub fn get_obj_class(&self, title: &str) -> Option<&ObjClass> {
        self.obj_classes.iter().find(|obj_class| obj_class.title == title)
    }

    /// Returns a copy of this meta with `tag_meta` appended.
    pub fn add_tag_meta(&self, tag_meta: TagMeta) -> Result<ProjectMeta, DefsError> {
        if self.has_tag_meta(&tag_meta.name) {
            return Err(DefsError::DuplicateTagMeta(tag_meta.name));
        }
        tag_meta.validate()?;

        let mut updated = self.clone();
        updated.tag_metas.push(tag_meta);
        Ok(updated)
    }
}
