/*!
 # Setting store

 Owns the ordered list of feeding settings for one controller. Every change
 goes through this type, which keeps positions dense (`1..=N`) and runs the
 validator before accepting operator input.
*/

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::codec::{self, EncodeMode};
use crate::setting::FeedingSetting;
use crate::validator;
use crate::{Error, Result};

/// Most settings a controller accepts
pub const MAX_SETTINGS: usize = 10;

/// A store shared between threads; lock it for the length of one operation
pub type SharedSettingStore = Arc<Mutex<SettingStore>>;

/// Ordered, validated collection of feeding settings
#[derive(Debug, Clone)]
pub struct SettingStore {
    settings: Vec<FeedingSetting>,
    capacity: usize,
}

impl Default for SettingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingStore {
    /// Creates an empty store holding up to [`MAX_SETTINGS`]
    pub fn new() -> Self {
        Self::with_capacity(MAX_SETTINGS)
    }

    /// Creates an empty store with a lower limit, clamped to `1..=MAX_SETTINGS`
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_SETTINGS);
        Self {
            settings: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Wraps the store for use from several threads
    pub fn shared(self) -> SharedSettingStore {
        Arc::new(Mutex::new(self))
    }

    /// Stored settings in position order
    pub fn settings(&self) -> &[FeedingSetting] {
        &self.settings
    }

    /// Setting at a 1-based position
    pub fn get(&self, position: usize) -> Option<&FeedingSetting> {
        position
            .checked_sub(1)
            .and_then(|index| self.settings.get(index))
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.settings.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Validates and appends a setting, returning the stored copy
    ///
    /// The start time must be empty or a clock time; it is stored zero-padded.
    #[instrument(skip(self, candidate), fields(start = %candidate.start_time))]
    pub fn add(&mut self, candidate: FeedingSetting) -> Result<FeedingSetting> {
        if self.is_full() {
            warn!("Store already holds {} settings", self.settings.len());
            return Err(Error::CapacityExceeded(self.capacity));
        }
        let candidate = candidate.normalize_start()?;

        if let Some(violation) = validator::validate(&candidate, &self.settings, None) {
            return Err(violation.into());
        }

        self.settings.push(candidate);
        self.reindex();

        let stored = self.settings[self.settings.len() - 1].clone();
        info!("Added {} at {}", stored.label(), stored.start_time);
        Ok(stored)
    }

    /// Validates and replaces the setting at `position`, returning the stored copy
    #[instrument(skip(self, candidate), fields(start = %candidate.start_time))]
    pub fn update(&mut self, position: usize, candidate: FeedingSetting) -> Result<FeedingSetting> {
        let index = self.index_of(position)?;
        let candidate = candidate.normalize_start()?;

        if let Some(violation) = validator::validate(&candidate, &self.settings, Some(position)) {
            return Err(violation.into());
        }

        self.settings[index] = candidate;
        self.reindex();

        let stored = self.settings[index].clone();
        info!("Updated {}", stored.label());
        Ok(stored)
    }

    /// Removes the setting at `position` and renumbers the rest
    #[instrument(skip(self))]
    pub fn remove(&mut self, position: usize) -> Result<FeedingSetting> {
        let index = self.index_of(position)?;
        let removed = self.settings.remove(index);
        self.reindex();

        info!("Removed setting at {}, {} left", removed.start_time, self.settings.len());
        Ok(removed)
    }

    /// Removes every setting
    pub fn clear(&mut self) {
        debug!("Clearing {} settings", self.settings.len());
        self.settings.clear();
    }

    /// Replaces the whole list without validation
    ///
    /// Used for settings decoded from the controller, which reflect what the
    /// device holds rather than operator input. Entries beyond the capacity
    /// are still kept.
    #[instrument(skip(self, settings), fields(count = settings.len()))]
    pub fn replace_all(&mut self, settings: Vec<FeedingSetting>) {
        if settings.len() > self.capacity {
            warn!(
                "Controller reported {} settings, more than the limit of {}",
                settings.len(),
                self.capacity
            );
        }
        self.settings = settings;
        self.reindex();
        info!("Loaded {} settings", self.settings.len());
    }

    /// Command payload for the current contents
    ///
    /// Uses the multi-setting form; an empty store yields a single default setting.
    pub fn payload(&self) -> String {
        codec::encode(&self.settings, EncodeMode::Multi)
    }

    fn index_of(&self, position: usize) -> Result<usize> {
        if position == 0 || position > self.settings.len() {
            return Err(Error::NotFound(position));
        }
        Ok(position - 1)
    }

    fn reindex(&mut self) {
        for (index, setting) in self.settings.iter_mut().enumerate() {
            setting.position = index + 1;
        }
    }
}
