use serde::Deserialize;

use crate::codec::{Codec, JsonCodec};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::Task;

/// Perform a single task and decode its response
pub async fn request<Res>(connection: &Connection, task: Task) -> Result<Res>
where
    Res: for<'de> Deserialize<'de>,
{
    let response = single_response(connection, task).await?;
    JsonCodec.decode(&response)
}

/// Perform a single task without inspecting its response
pub async fn send(connection: &Connection, task: Task) -> Result<()> {
    single_response(connection, task).await.map(drop)
}

async fn single_response(connection: &Connection, task: Task) -> Result<String> {
    let envelope = connection.send_tasks(vec![task]).await?;
    envelope
        .responses
        .into_iter()
        .next()
        .ok_or(Error::ResponseMismatch {
            expected: 1,
            actual: 0,
        })
}
