use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use taskwatch::{
    client::{ClientError, NewTask, TaskClient},
    job::{Job, JobId, TaskStats, ToolType},
};
use tracing::instrument;

use crate::{
    map_err,
    types::{ErrorBody, ListQuery},
    HttpTaskClient,
};

impl HttpTaskClient {
    /// Turn a non-success response into a [`ClientError`], reading the backend's `detail`.
    async fn check(response: Response, id: Option<&JobId>) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if let (StatusCode::NOT_FOUND, Some(id)) = (status, id) {
            return Err(ClientError::NotFound(id.clone()));
        }
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        let message = body.into_message().unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_owned()
        });
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn read<T: DeserializeOwned>(
        response: Response,
        id: Option<&JobId>,
    ) -> Result<T, ClientError> {
        let bytes = Self::check(response, id)
            .await?
            .bytes()
            .await
            .map_err(map_err)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl TaskClient for HttpTaskClient {
    #[instrument(skip_all, fields(tool_type = %task.tool_type))]
    async fn create(&self, task: NewTask) -> Result<Job, ClientError> {
        let response = self
            .http
            .post(self.url("/tasks/"))
            .json(&task)
            .send()
            .await
            .map_err(map_err)?;
        Self::read(response, None).await
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &JobId) -> Result<Job, ClientError> {
        let response = self
            .http
            .get(self.task_url(id, ""))
            .send()
            .await
            .map_err(map_err)?;
        Self::read(response, Some(id)).await
    }

    #[instrument(skip(self))]
    async fn list(&self, tool_type: Option<&ToolType>) -> Result<Vec<Job>, ClientError> {
        let response = self
            .http
            .get(self.url("/tasks/"))
            .query(&ListQuery::new(self.list_limit, tool_type))
            .send()
            .await
            .map_err(map_err)?;
        Self::read(response, None).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &JobId) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.task_url(id, ""))
            .send()
            .await
            .map_err(map_err)?;
        Self::check(response, Some(id)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn retry(&self, id: &JobId) -> Result<Job, ClientError> {
        let response = self
            .http
            .post(self.task_url(id, "/retry"))
            .send()
            .await
            .map_err(map_err)?;
        Self::read(response, Some(id)).await
    }

    #[instrument(skip(self))]
    async fn cancel(&self, id: &JobId) -> Result<Job, ClientError> {
        let response = self
            .http
            .post(self.task_url(id, "/cancel"))
            .send()
            .await
            .map_err(map_err)?;
        Self::read(response, Some(id)).await
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> Result<TaskStats, ClientError> {
        let response = self
            .http
            .get(self.url("/tasks/stats"))
            .send()
            .await
            .map_err(map_err)?;
        Self::read(response, None).await
    }
}
