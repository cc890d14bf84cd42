use anyhow::Context;
use sled::{Db, Tree};
use uuid::Uuid;

use guild_common::jobs::{Job, NewJob, Page};

/// Job-board postings, served newest-first through the shared pagination
/// envelope.
#[derive(Clone)]
pub struct Jobs {
    tree: Tree,
}

impl Jobs {
    pub fn new(db: &Db) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("jobs")?,
        })
    }

    pub fn add(&self, new_job: NewJob) -> anyhow::Result<Job> {
        let job = Job {
            id: Uuid::new_v4().to_string(),
            title: new_job.title,
            company: new_job.company,
            location: new_job.location,
            description: new_job.description,
            posted_at: chrono::Utc::now(),
        };
        self.tree
            .insert(job.id.as_bytes(), serde_json::to_vec(&job)?)?;
        Ok(job)
    }

    pub fn page(&self, offset: usize, limit: usize, query: Option<&str>) -> anyhow::Result<Page<Job>> {
        let needle = query.map(str::to_lowercase);
        let mut jobs = Vec::new();
        for entry in self.tree.iter() {
            let (_, bytes) = entry?;
            let job: Job = serde_json::from_slice(&bytes).context("corrupt job record")?;
            let keep = match &needle {
                Some(needle) => {
                    job.title.to_lowercase().contains(needle)
                        || job.company.to_lowercase().contains(needle)
                        || job.location.to_lowercase().contains(needle)
                }
                None => true,
            };
            if keep {
                jobs.push(job);
            }
        }
        jobs.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
        let total = jobs.len();
        let items: Vec<Job> = jobs.into_iter().skip(offset).take(limit).collect();
        Ok(Page {
            has_next: offset + items.len() < total,
            total,
            items,
        })
    }
}
