//! Structural validators, one per content type.
//!
//! The queue talks to validators through `StructuralValidator` so an
//! external validation service can stand in for the built-in rules.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::content::ContentType;
use crate::error::ValidationError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl StructuralReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

#[async_trait]
pub trait StructuralValidator: Send + Sync {
    /// Checks `content` against the rules for `content_type`.
    ///
    /// Invalid content is reported in the returned report; `Err` means the
    /// validator itself could not answer.
    async fn validate(
        &self,
        content_type: ContentType,
        content: &Value,
    ) -> Result<StructuralReport, ValidationError>;
}

/// Rules shipped with the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinValidators;

#[async_trait]
impl StructuralValidator for BuiltinValidators {
    async fn validate(
        &self,
        content_type: ContentType,
        content: &Value,
    ) -> Result<StructuralReport, ValidationError> {
        Ok(check_structure(content_type, content))
    }
}

pub fn check_structure(content_type: ContentType, content: &Value) -> StructuralReport {
    let mut report = StructuralReport::default();
    let Some(object) = content.as_object() else {
        report.error(format!("{} content must be a JSON object", content_type));
        return report;
    };

    match content_type {
        ContentType::Game => check_game(object, &mut report),
        ContentType::Scene => check_scene(object, "", &mut report),
        ContentType::Quiz => check_quiz(object, &mut report),
        ContentType::Dialogue => check_dialogue(object, &mut report),
    }
    report
}

fn non_empty_str<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn check_game(game: &Map<String, Value>, report: &mut StructuralReport) {
    if non_empty_str(game, "title").is_none() {
        report.error("game.title is required");
    }
    if non_empty_str(game, "description").is_none() {
        report.warn("game.description is missing");
    }

    match game.get("scenes").and_then(Value::as_array) {
        None => report.error("game.scenes must be an array"),
        Some(scenes) if scenes.is_empty() => report.error("game.scenes must not be empty"),
        Some(scenes) => {
            for (i, scene) in scenes.iter().enumerate() {
                match scene.as_object() {
                    Some(scene) => check_scene(scene, &format!("game.scenes[{}].", i), report),
                    None => report.error(format!("game.scenes[{}] must be an object", i)),
                }
            }
        }
    }
}

fn check_scene(scene: &Map<String, Value>, path: &str, report: &mut StructuralReport) {
    if non_empty_str(scene, "id").is_none() {
        report.error(format!("{}id is required", scene_path(path)));
    }
    match scene.get("elements") {
        Some(Value::Array(elements)) if elements.is_empty() => {
            report.warn(format!("{}elements is empty", scene_path(path)));
        }
        Some(Value::Array(_)) => {}
        // Nested scenes inside a game may omit elements.
        None if !path.is_empty() => {}
        _ => report.error(format!("{}elements must be an array", scene_path(path))),
    }
}

fn scene_path(path: &str) -> String {
    if path.is_empty() {
        "scene.".to_string()
    } else {
        path.to_string()
    }
}

fn check_quiz(quiz: &Map<String, Value>, report: &mut StructuralReport) {
    if non_empty_str(quiz, "title").is_none() {
        report.error("quiz.title is required");
    }

    let questions = match quiz.get("questions").and_then(Value::as_array) {
        Some(questions) if !questions.is_empty() => questions,
        Some(_) => return report.error("quiz.questions must not be empty"),
        None => return report.error("quiz.questions must be an array"),
    };

    for (i, question) in questions.iter().enumerate() {
        let path = format!("quiz.questions[{}]", i);
        let Some(question) = question.as_object() else {
            report.error(format!("{} must be an object", path));
            continue;
        };
        if non_empty_str(question, "prompt")
            .or_else(|| non_empty_str(question, "text"))
            .is_none()
        {
            report.error(format!("{}.prompt is required", path));
        }

        let options = question.get("options").and_then(Value::as_array);
        let option_count = options.map(Vec::len).unwrap_or(0);
        if option_count < 2 {
            report.error(format!("{}.options needs at least 2 entries", path));
        }

        match question.get("answer").map(Value::as_u64) {
            None => report.error(format!("{}.answer is required", path)),
            Some(None) => report.error(format!("{}.answer must be an option index", path)),
            Some(Some(answer)) if option_count >= 2 && answer as usize >= option_count => {
                report.error(format!("{}.answer {} is out of range", path, answer));
            }
            Some(Some(_)) => {}
        }
    }
}

fn check_dialogue(dialogue: &Map<String, Value>, report: &mut StructuralReport) {
    let lines = match dialogue.get("lines").and_then(Value::as_array) {
        Some(lines) if !lines.is_empty() => lines,
        Some(_) => return report.error("dialogue.lines must not be empty"),
        None => return report.error("dialogue.lines must be an array"),
    };

    for (i, line) in lines.iter().enumerate() {
        let Some(line) = line.as_object() else {
            report.error(format!("dialogue.lines[{}] must be an object", i));
            continue;
        };
        if non_empty_str(line, "speaker").is_none() {
            report.error(format!("dialogue.lines[{}].speaker is required", i));
        }
        if non_empty_str(line, "text").is_none() {
            report.error(format!("dialogue.lines[{}].text is required", i));
        }
    }
}
