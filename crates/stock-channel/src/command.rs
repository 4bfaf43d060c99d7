//! Stock decrement command and its wire format.

use common::ProductId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChannelError, Result};

/// Unique identity of a stock command, used by consumers for de-duplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(Uuid);

impl CommandId {
    /// Creates a new random command ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a command ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request to decrement the stock of one product.
///
/// Serialized as `{"commandId": ..., "productId": ..., "productCount": ...}`.
/// One command is produced per order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDecrementCommand {
    pub command_id: CommandId,
    pub product_id: ProductId,
    #[serde(rename = "productCount")]
    pub quantity: u32,
}

impl StockDecrementCommand {
    /// Creates a command with a fresh identity.
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            command_id: CommandId::new(),
            product_id,
            quantity,
        }
    }

    /// Returns the key the channel partitions on.
    pub fn partition_key(&self) -> String {
        self.product_id.to_string()
    }

    /// Encodes the command as JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a command from JSON bytes.
    ///
    /// A zero quantity is rejected alongside malformed JSON: neither can be
    /// applied meaningfully.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let command: Self = serde_json::from_slice(bytes)
            .map_err(|e| ChannelError::MessageFormat(e.to_string()))?;
        if command.quantity == 0 {
            return Err(ChannelError::MessageFormat(
                "productCount must be greater than 0".to_string(),
            ));
        }
        Ok(command)
    }
}
