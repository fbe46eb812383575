use log::{error, info};
use std::error::Error as StdError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::prompt;
use crate::llm::chat::{self, ChatClient, SendError};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "pdf"];

/// Drives the full batch: every prompt template of every owner, paired with
/// every test image, sent strictly one at a time.
pub struct BatchRunner {
    client: Arc<dyn ChatClient>,
    prompts_path: PathBuf,
    images_path: PathBuf,
    default_top_p: f32,
}

impl BatchRunner {
    pub fn new(
        client: Arc<dyn ChatClient>,
        prompts_path: PathBuf,
        images_path: PathBuf,
        default_top_p: f32,
    ) -> Self {
        Self {
            client,
            prompts_path,
            images_path,
            default_top_p,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let images = list_images(&self.images_path)?;
        info!(
            "sending {} test image(s) from {} to model '{}'",
            images.len(),
            self.images_path.display(),
            self.client.model()
        );

        for owner in list_owners(&self.prompts_path)? {
            info!("{}:", owner);
            let owner_dir = self.prompts_path.join(&owner);

            for template in list_templates(&owner_dir)? {
                let name = template
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                info!("\t{}", name);

                for image in &images {
                    self.run_pair(&owner_dir, &template, image).await?;
                }
            }
        }

        Ok(())
    }

    /// Send one (template, image) pair and persist the answer. A template
    /// that cannot produce a request (no text, no turns) is logged and
    /// skipped so the rest of the batch keeps going; everything else is
    /// fatal.
    async fn run_pair(
        &self,
        owner_dir: &Path,
        template: &Path,
        image: &Path,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let turns = prompt::load_prompt(template)?;

        let conversation = match chat::build_conversation(&turns, image, self.default_top_p) {
            Ok(conversation) => conversation,
            Err(err @ (SendError::MissingText(_) | SendError::EmptyTemplate)) => {
                error!("{}: {}", template.display(), err);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let stream = self.client.send(&conversation).await?;
        let answer = chat::consume_stream(stream).await?;

        let output = answer_path(owner_dir, template, image);
        persist(&answer, &output)?;
        info!("wrote {}", output.display());
        Ok(())
    }
}

/// Write the accumulated answer, creating parent directories on demand and
/// overwriting any previous content.
pub fn persist(answer: &str, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, answer)
}

fn list_owners(prompts_path: &Path) -> io::Result<Vec<String>> {
    let mut owners = Vec::new();
    for entry in fs::read_dir(prompts_path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            owners.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    owners.sort();
    Ok(owners)
}

fn list_templates(owner_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut templates = Vec::new();
    for entry in fs::read_dir(owner_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if path.is_file() && is_json {
            templates.push(path);
        }
    }
    templates.sort();
    Ok(templates)
}

fn list_images(images_path: &Path) -> io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(images_path)? {
        let entry = entry?;
        let path = entry.path();
        let is_image = path
            .extension()
            .map(|ext| IMAGE_EXTENSIONS.iter().any(|x| ext.eq_ignore_ascii_case(x)))
            .unwrap_or(false);
        if path.is_file() && is_image {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Output file for one (template, image) pair:
/// `<owner>/responses/<template-stem>/<image-stem>.txt`.
fn answer_path(owner_dir: &Path, template: &Path, image: &Path) -> PathBuf {
    let template_stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let image_stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    owner_dir
        .join("responses")
        .join(template_stem)
        .join(format!("{}.txt", image_stem))
}
