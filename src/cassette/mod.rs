//! Cassette store: an ordered, thread-safe collection of interactions for one fixture
//!
//! Lookups follow one-shot consumption: the first interaction whose request
//! matches is removed from the cassette and handed out, so every recorded
//! exchange can satisfy exactly one live request. A test that issues the same
//! call twice needs two recorded interactions.

mod format;

pub use format::{
    CapturedRequest, CapturedResponse, FormValues, Headers, Interaction, Payload,
    CASSETTE_EXTENSION, CASSETTE_FORMAT_V1,
};

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::LoadError;
use crate::matcher::{DefaultMatcher, Matcher};
use crate::{Result, TapedeckError};

use format::{CassetteDocument, CassetteDocumentRef};

/// Named collection of recorded interactions
pub struct Cassette {
    name: String,
    path: PathBuf,
    version: u32,
    interactions: RwLock<Vec<Interaction>>,
    matcher: Arc<dyn Matcher>,
}

impl Cassette {
    /// Create a new empty cassette
    ///
    /// No I/O happens until [`Cassette::save`].
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: fixture_path(name),
            version: CASSETTE_FORMAT_V1,
            interactions: RwLock::new(Vec::new()),
            matcher: Arc::new(DefaultMatcher),
        }
    }

    /// Read a cassette file from disk
    ///
    /// The matcher is not part of the file and starts out as
    /// [`DefaultMatcher`]; install a custom one afterwards if needed.
    ///
    /// # Errors
    ///
    /// Returns [`TapedeckError::Load`] if the file cannot be read, is not a
    /// valid cassette document, or carries an unsupported version
    pub fn load(name: &str) -> Result<Self> {
        let mut cassette = Self::new(name);
        let document = read_document(&cassette.path).map_err(|source| TapedeckError::Load {
            path: cassette.path.clone(),
            source,
        })?;

        info!(
            "Loaded cassette '{}': {} interactions",
            name,
            document.interactions.len()
        );

        cassette.version = document.version;
        cassette.interactions = RwLock::new(document.interactions);
        Ok(cassette)
    }

    /// Replace the matcher used by [`Cassette::find_and_consume`]
    pub fn set_matcher(&mut self, matcher: impl Matcher + 'static) {
        self.matcher = Arc::new(matcher);
    }

    /// Builder form of [`Cassette::set_matcher`]
    #[must_use]
    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.set_matcher(matcher);
        self
    }

    /// Logical fixture name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixture path on disk
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format version
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Number of interactions not yet consumed
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the cassette holds no interactions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Point-in-time copy of the interaction sequence
    #[must_use]
    pub fn interactions(&self) -> Vec<Interaction> {
        self.read().clone()
    }

    /// Append a new interaction to the cassette
    pub fn append(&self, interaction: Interaction) {
        let mut interactions = self.write();
        debug!(
            "Appending interaction: {} {} (cassette: {}, count: {})",
            interaction.request.method,
            interaction.request.url,
            self.name,
            interactions.len() + 1
        );
        interactions.push(interaction);
    }

    /// Take the first interaction whose request matches `live`
    ///
    /// Scanning and removal happen under one exclusive lock, so concurrent
    /// callers can never be handed the same interaction.
    ///
    /// # Errors
    ///
    /// Returns [`TapedeckError::InteractionNotFound`] if no remaining
    /// interaction matches; the cassette is left unchanged
    pub fn find_and_consume(&self, live: &CapturedRequest) -> Result<Interaction> {
        let mut interactions = self.write();

        let position = interactions
            .iter()
            .position(|interaction| self.matcher.matches(live, &interaction.request))
            .ok_or_else(|| TapedeckError::InteractionNotFound {
                method: live.method.clone(),
                url: live.url.clone(),
            })?;

        Ok(interactions.remove(position))
    }

    /// Write the cassette to disk for future re-use
    ///
    /// An empty cassette is never written: the call succeeds without creating
    /// the file or its directory, so an accidental no-op run cannot clobber a
    /// fixture. The document is written to a uniquely named temporary file
    /// in the fixture directory and renamed into place, so concurrent saves
    /// never observe each other's partial output.
    ///
    /// # Errors
    ///
    /// Returns [`TapedeckError::Persistence`] if the directory cannot be
    /// created or the file cannot be serialized or written
    pub fn save(&self) -> Result<()> {
        let interactions = self.read();

        if interactions.is_empty() {
            debug!("Cassette '{}' is empty, skipping save", self.name);
            return Ok(());
        }

        let document = CassetteDocumentRef {
            version: self.version,
            interactions: &interactions,
        };

        write_document(&self.path, &document).map_err(|source| TapedeckError::Persistence {
            path: self.path.clone(),
            source,
        })?;

        info!(
            "Saved cassette '{}': {} interactions to {}",
            self.name,
            interactions.len(),
            self.path.display()
        );

        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Interaction>> {
        self.interactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Interaction>> {
        self.interactions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Cassette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cassette")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("version", &self.version)
            .field("interactions", &self.len())
            .finish_non_exhaustive()
    }
}

/// Derive the fixture path for a cassette name
#[must_use]
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(format!("{name}.{CASSETTE_EXTENSION}"))
}

fn read_document(path: &Path) -> std::result::Result<CassetteDocument, LoadError> {
    let data = fs::read(path)?;
    let document: CassetteDocument = serde_json::from_slice(&data)?;

    if document.version != CASSETTE_FORMAT_V1 {
        return Err(LoadError::UnsupportedVersion(document.version));
    }

    for interaction in &document.interactions {
        let code = interaction.response.code;
        if !(100..=999).contains(&code) {
            return Err(LoadError::InvalidStatusCode(code));
        }
    }

    Ok(document)
}

fn write_document(path: &Path, document: &CassetteDocumentRef<'_>) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir)?;
            dir
        }
        _ => Path::new("."),
    };

    let data = serde_json::to_vec_pretty(document)?;

    // Dropping the temp file on any error removes it
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&data)?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}
