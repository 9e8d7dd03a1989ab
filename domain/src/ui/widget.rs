//! Widget kinds and the values they exchange with the host.
//!
//! A [`Widget`] carries the value the host should display. When the user
//! edits it, the host sends a [`ChangeEvent`] and the tool runtime extracts
//! the relevant field with [`Widget::value_from_event`].

use super::change::ChangeEvent;
use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Map viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapView {
    pub lon: f64,
    pub lat: f64,
    pub zoom: f64,
}

/// A primitive drawn by a canvas widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Paint")]
pub enum PaintCommand {
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: Rgba,
        border: f64,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: Rgba,
        width: f64,
    },
    Circle {
        x: f64,
        y: f64,
        rad: f64,
        color: Rgba,
        border: f64,
    },
    Text {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        text: String,
        color: Rgba,
    },
    File {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        path: String,
    },
}

/// A value written into a bound slot when a change event is replayed.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetValue {
    Text(String),
    Float(f64),
    Int(i64),
    Bool(bool),
    Bytes(Vec<u8>),
    Color(Rgba),
    Map(MapView),
    /// Pure actions (button clicks) carry no value.
    None,
}

/// Widget kinds understood by the host renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Kind")]
pub enum Widget {
    /// Pure container; children are laid out on its grid.
    Layout,
    Text {
        label: String,
        /// Accepts drag-and-drop text; drops are delivered as change events.
        #[serde(default)]
        drop_target: bool,
    },
    Button {
        label: String,
        #[serde(default)]
        icon: String,
    },
    Editbox {
        value: String,
        #[serde(default)]
        multiline: bool,
        /// Name used by `ActivateEditbox`.
        #[serde(default)]
        name: String,
    },
    Slider {
        value: f64,
        min: f64,
        max: f64,
        step: f64,
    },
    Dropdown {
        value: String,
        labels: Vec<String>,
        values: Vec<String>,
    },
    Switch {
        value: bool,
        label: String,
    },
    Checkbox {
        value: bool,
        label: String,
    },
    FilePicker {
        path: String,
        #[serde(default)]
        select_file: bool,
    },
    DatePicker {
        /// Unix seconds.
        value: i64,
        #[serde(default)]
        show_time: bool,
    },
    ColorPicker {
        value: Rgba,
    },
    Map {
        value: MapView,
    },
    Microphone {
        /// Logical microphone id used with `start_microphone`.
        mic_uid: String,
        format: String,
        #[serde(default)]
        transcribe: bool,
    },
    /// A button that can be dragged onto siblings sharing `group` to reorder.
    ButtonDropMove {
        label: String,
        group: String,
        pos: i64,
    },
    Canvas {
        paint: Vec<PaintCommand>,
    },
}

impl Widget {
    pub fn kind(&self) -> &'static str {
        match self {
            Widget::Layout => "Layout",
            Widget::Text { .. } => "Text",
            Widget::Button { .. } => "Button",
            Widget::Editbox { .. } => "Editbox",
            Widget::Slider { .. } => "Slider",
            Widget::Dropdown { .. } => "Dropdown",
            Widget::Switch { .. } => "Switch",
            Widget::Checkbox { .. } => "Checkbox",
            Widget::FilePicker { .. } => "FilePicker",
            Widget::DatePicker { .. } => "DatePicker",
            Widget::ColorPicker { .. } => "ColorPicker",
            Widget::Map { .. } => "Map",
            Widget::Microphone { .. } => "Microphone",
            Widget::ButtonDropMove { .. } => "ButtonDropMove",
            Widget::Canvas { .. } => "Canvas",
        }
    }

    /// Value currently displayed, used by the diff guard.
    pub fn current_value(&self) -> WidgetValue {
        match self {
            Widget::Editbox { value, .. } | Widget::Dropdown { value, .. } => {
                WidgetValue::Text(value.clone())
            }
            Widget::FilePicker { path, .. } => WidgetValue::Text(path.clone()),
            Widget::Slider { value, .. } => WidgetValue::Float(*value),
            Widget::Switch { value, .. } | Widget::Checkbox { value, .. } => {
                WidgetValue::Bool(*value)
            }
            Widget::DatePicker { value, .. } => WidgetValue::Int(*value),
            Widget::ColorPicker { value } => WidgetValue::Color(*value),
            Widget::Map { value } => WidgetValue::Map(*value),
            _ => WidgetValue::None,
        }
    }

    /// Widgets whose events always fire, even when nothing "changed".
    pub fn is_action(&self) -> bool {
        matches!(
            self,
            Widget::Button { .. }
                | Widget::ButtonDropMove { .. }
                | Widget::Microphone { .. }
                | Widget::Text {
                    drop_target: true,
                    ..
                }
        )
    }

    /// Whether this widget reacts to change events at all.
    pub fn accepts_events(&self) -> bool {
        !matches!(
            self,
            Widget::Layout
                | Widget::Canvas { .. }
                | Widget::Text {
                    drop_target: false,
                    ..
                }
        )
    }

    /// Extract the value this widget kind reads from a change event.
    pub fn value_from_event(&self, event: &ChangeEvent) -> Result<WidgetValue, DomainError> {
        let value = match self {
            Widget::Editbox { .. } | Widget::Dropdown { .. } | Widget::FilePicker { .. } => {
                WidgetValue::Text(event.value_string.clone())
            }
            Widget::Text {
                drop_target: true, ..
            } => WidgetValue::Text(event.value_string.clone()),
            Widget::Slider { min, max, .. } => {
                WidgetValue::Float(event.value_float.clamp(*min, max.max(*min)))
            }
            Widget::Switch { .. } | Widget::Checkbox { .. } => WidgetValue::Bool(event.value_bool),
            Widget::DatePicker { .. } => WidgetValue::Int(event.value_int),
            Widget::ButtonDropMove { .. } => WidgetValue::Int(event.value_int),
            Widget::ColorPicker { .. } => match event.value_bytes.as_slice() {
                [r, g, b, a] => WidgetValue::Color(Rgba::new(*r, *g, *b, *a)),
                other => {
                    return Err(DomainError::InvalidChangeEvent(format!(
                        "color expects 4 bytes, got {}",
                        other.len()
                    )));
                }
            },
            Widget::Map { .. } => {
                let view: MapView = serde_json::from_str(&event.value_string)
                    .map_err(|e| DomainError::InvalidChangeEvent(format!("map view: {}", e)))?;
                WidgetValue::Map(view)
            }
            Widget::Microphone { .. } => WidgetValue::Bytes(event.value_bytes.clone()),
            Widget::Button { .. } => WidgetValue::None,
            Widget::Layout | Widget::Canvas { .. } | Widget::Text { .. } => {
                return Err(DomainError::InvalidChangeEvent(format!(
                    "{} does not accept events",
                    self.kind()
                )));
            }
        };
        Ok(value)
    }

    /// Reflect an applied value in the displayed widget.
    pub fn set_value(&mut self, value: &WidgetValue) {
        match (self, value) {
            (Widget::Editbox { value: v, .. }, WidgetValue::Text(t))
            | (Widget::Dropdown { value: v, .. }, WidgetValue::Text(t))
            | (Widget::FilePicker { path: v, .. }, WidgetValue::Text(t)) => *v = t.clone(),
            (Widget::Slider { value: v, .. }, WidgetValue::Float(f)) => *v = *f,
            (Widget::Switch { value: v, .. }, WidgetValue::Bool(b))
            | (Widget::Checkbox { value: v, .. }, WidgetValue::Bool(b)) => *v = *b,
            (Widget::DatePicker { value: v, .. }, WidgetValue::Int(i)) => *v = *i,
            (Widget::ColorPicker { value: v }, WidgetValue::Color(c)) => *v = *c,
            (Widget::Map { value: v }, WidgetValue::Map(m)) => *v = *m,
            _ => {}
        }
    }
}
