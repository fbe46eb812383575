use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum PromptError {
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// One turn of a prompt template as stored on disk. `text` is required at
/// send time; everything else is optional.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct PromptTurn {
    pub role: Option<String>,
    pub text: Option<String>,
    pub image_path: Option<PathBuf>,
    #[serde(default, deserialize_with = "top_p_lenient")]
    pub top_p: Option<f32>,
}

/// A template file holds either a single turn object or an ordered list of them.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum PromptFile {
    Single(PromptTurn),
    Sequence(Vec<PromptTurn>),
}

pub fn load_prompt<P: AsRef<Path>>(path: P) -> Result<Vec<PromptTurn>, PromptError> {
    let file_content = fs::read_to_string(path.as_ref())?;
    let parsed: PromptFile = serde_json::from_str(&file_content)?;
    Ok(match parsed {
        PromptFile::Single(turn) => vec![turn],
        PromptFile::Sequence(turns) => turns,
    })
}

// Template authors write top_p both as a JSON number and as a quoted string.
fn top_p_lenient<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(value)) => Ok(Some(value)),
        Some(Raw::Text(text)) => text
            .trim()
            .parse::<f32>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid top_p '{}': {}", text, e))),
    }
}
