use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::agent::UpdateStats;
use crate::env::EpisodeInfo;
use crate::error::PgError;

/// Rolling window over the most recently finished episodes
pub struct EpisodeStats {
    capacity: usize,
    rewards: VecDeque<f32>,
    lengths: VecDeque<usize>,
    total_episodes: usize,
}

impl EpisodeStats {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            capacity,
            rewards: VecDeque::with_capacity(capacity),
            lengths: VecDeque::with_capacity(capacity),
            total_episodes: 0,
        }
    }

    pub fn add(
        &mut self,
        episode: &EpisodeInfo,
    ) {
        if self.rewards.len() == self.capacity {
            self.rewards.pop_front();
            self.lengths.pop_front();
        }
        self.rewards.push_back(episode.reward);
        self.lengths.push_back(episode.length);
        self.total_episodes += 1;
    }

    pub fn total_episodes(&self) -> usize { self.total_episodes }

    pub fn mean_reward(&self) -> Option<f32> {
        (!self.rewards.is_empty()).then(|| self.rewards.iter().sum::<f32>() / self.rewards.len() as f32)
    }

    pub fn mean_length(&self) -> Option<f32> {
        (!self.lengths.is_empty()).then(|| self.lengths.iter().sum::<usize>() as f32 / self.lengths.len() as f32)
    }
}

/// One line of the training metric stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub step: u64,
    #[serde(flatten)]
    pub stats: UpdateStats,
    pub ep_rew_mean: Option<f32>,
    pub ep_len_mean: Option<f32>,
    pub episodes: usize,
}

impl UpdateRecord {
    pub fn new(
        step: u64,
        stats: UpdateStats,
        episodes: &EpisodeStats,
    ) -> Self {
        Self {
            step,
            stats,
            ep_rew_mean: episodes.mean_reward(),
            ep_len_mean: episodes.mean_length(),
            episodes: episodes.total_episodes(),
        }
    }
}

/// Writes [UpdateRecord]s as JSON lines
pub struct ProgressWriter {
    writer: BufWriter<File>,
}

impl ProgressWriter {
    /// Truncates an existing file
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(PgError::from)?;
        Ok(Self { writer: BufWriter::new(file) })
    }

    pub fn write(
        &mut self,
        record: &UpdateRecord,
    ) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record).map_err(PgError::from)?;
        self.writer.write_all(b"\n").map_err(PgError::from)?;
        self.writer.flush().map_err(PgError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn episode(reward: f32, length: usize) -> EpisodeInfo {
        EpisodeInfo { reward, length }
    }

    #[test]
    fn test_rolling_window() {
        let mut stats = EpisodeStats::new(2);
        assert_eq!(stats.mean_reward(), None);
        stats.add(&episode(1.0, 10));
        stats.add(&episode(2.0, 20));
        stats.add(&episode(6.0, 40));
        assert_eq!(stats.mean_reward(), Some(4.0));
        assert_eq!(stats.mean_length(), Some(30.0));
        assert_eq!(stats.total_episodes(), 3);
    }

    #[test]
    fn test_progress_lines() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("progress.jsonl");
        let mut stats = EpisodeStats::new(100);
        stats.add(&episode(3.0, 7));

        let mut writer = ProgressWriter::create(&path)?;
        writer.write(&UpdateRecord::new(1024, UpdateStats::default(), &stats))?;
        writer.write(&UpdateRecord::new(2048, UpdateStats::default(), &stats))?;

        let content = fs::read_to_string(&path)?;
        let records = content.lines()
            .map(serde_json::from_str::<UpdateRecord>)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].step, 2048);
        assert_eq!(records[1].ep_rew_mean, Some(3.0));
        Ok(())
    }
}
