use anyhow::Result;
use reqwest::Client;

use guild_common::jobs::{Job, NewJob, Page};

pub async fn post_job(client: &Client, base: impl AsRef<str>, new_job: &NewJob) -> Result<Job> {
    Ok(client
        .post(format!("{}/jobs", base.as_ref()))
        .json(new_job)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?)
}

pub async fn list_jobs(
    client: &Client,
    base: impl AsRef<str>,
    offset: usize,
    limit: usize,
    query: Option<&str>,
) -> Result<Page<Job>> {
    let mut request = client
        .get(format!("{}/jobs", base.as_ref()))
        .query(&[("offset", offset.to_string()), ("limit", limit.to_string())]);
    if let Some(query) = query {
        request = request.query(&[("q", query)]);
    }
    Ok(request.send().await?.error_for_status()?.json().await?)
}
