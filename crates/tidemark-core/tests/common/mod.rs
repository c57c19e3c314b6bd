//! Shared board domain used by the integration tests.

// Not every test binary exercises every fixture.
#![allow(dead_code)]

use std::any::Any;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tidemark_core::aggregate::{AggregateRoot, AggregateState, EventRouter};
use tidemark_core::command::Command;
use tidemark_core::context::CommandHandlingContext;
use tidemark_core::error::{AggregateError, HandlerError};
use tidemark_core::event::{DomainEvent, TypedEvent};
use tidemark_core::handler::CommandHandler;
use tidemark_core::identifier::AggregateId;

pub const BOARD_KIND: &str = "board";

#[must_use]
pub fn board_id() -> AggregateId {
    AggregateId::new(BOARD_KIND, Uuid::new_v4())
}

// --- events ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardCreated {
    pub id: AggregateId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameChange {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardNameUpdated {
    pub id: AggregateId,
    pub name: NameChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardArchived {
    pub id: AggregateId,
    pub name: String,
}

macro_rules! board_event {
    ($event:ident, $tag:literal) => {
        impl DomainEvent for $event {
            fn event_type(&self) -> &'static str {
                Self::EVENT_TYPE
            }
            fn payload(&self) -> serde_json::Value {
                serde_json::to_value(self).expect("board event serializes")
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }
        impl TypedEvent for $event {
            const EVENT_TYPE: &'static str = $tag;
        }
    };
}

board_event!(BoardCreated, "board-created");
board_event!(BoardNameUpdated, "board-name-updated");
board_event!(BoardArchived, "board-archived");

// --- state ----------------------------------------------------------------

#[derive(Debug, Default)]
pub struct BoardState {
    pub name: String,
    pub archived: bool,
}

impl AggregateState for BoardState {
    const KIND: &'static str = BOARD_KIND;

    fn router() -> Result<EventRouter<Self>, AggregateError> {
        let mut router = EventRouter::new();
        router
            .register::<BoardCreated, _>(|state: &mut Self, event| {
                state.name = event.name.clone();
            })?
            .register::<BoardNameUpdated, _>(|state, event| {
                state.name = event.name.new.clone();
            })?
            .register::<BoardArchived, _>(|state, _| {
                state.archived = true;
            })?;
        Ok(router)
    }
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("board is already archived")]
    AlreadyArchived,

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Creates a board aggregate and applies its creation event.
pub fn create_board(id: AggregateId, name: &str) -> Result<AggregateRoot<BoardState>, BoardError> {
    let mut root = AggregateRoot::create(id.clone())?;
    root.apply(BoardCreated {
        id,
        name: name.to_owned(),
    })?;
    Ok(root)
}

/// Domain operations on a board aggregate.
pub trait BoardOps {
    fn update_name(&mut self, name: &str) -> Result<(), BoardError>;
    fn archive(&mut self) -> Result<(), BoardError>;
}

impl BoardOps for AggregateRoot<BoardState> {
    fn update_name(&mut self, name: &str) -> Result<(), BoardError> {
        if self.state().archived {
            return Err(BoardError::AlreadyArchived);
        }
        let id = self.identifier().cloned().ok_or(AggregateError::NotInitialized)?;
        let old = self.state().name.clone();
        self.apply(BoardNameUpdated {
            id,
            name: NameChange {
                old,
                new: name.to_owned(),
            },
        })?;
        Ok(())
    }

    fn archive(&mut self) -> Result<(), BoardError> {
        if self.state().archived {
            return Err(BoardError::AlreadyArchived);
        }
        let id = self.identifier().cloned().ok_or(AggregateError::NotInitialized)?;
        let name = self.state().name.clone();
        self.apply(BoardArchived { id, name })?;
        Ok(())
    }
}

// --- commands -------------------------------------------------------------

#[derive(Debug)]
pub struct CreateBoard {
    pub id: AggregateId,
    pub name: String,
    pub correlation_id: Uuid,
}

#[derive(Debug)]
pub struct UpdateBoardName {
    pub id: AggregateId,
    pub name: String,
    pub correlation_id: Uuid,
}

#[derive(Debug)]
pub struct ArchiveBoard {
    pub id: AggregateId,
    pub correlation_id: Uuid,
}

macro_rules! board_command {
    ($command:ident, $tag:literal) => {
        impl Command for $command {
            fn command_type(&self) -> &'static str {
                $tag
            }
            fn correlation_id(&self) -> Uuid {
                self.correlation_id
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

board_command!(CreateBoard, "create-board");
board_command!(UpdateBoardName, "update-board-name");
board_command!(ArchiveBoard, "archive-board");

// --- handlers -------------------------------------------------------------

pub struct CreateBoardHandler;

#[async_trait]
impl CommandHandler<CreateBoard> for CreateBoardHandler {
    async fn handle(
        &self,
        command: &CreateBoard,
        ctx: &CommandHandlingContext,
        _token: &CancellationToken,
    ) -> Result<(), HandlerError> {
        let repository = ctx.repository::<BoardState>();
        let board = create_board(command.id.clone(), &command.name)?;
        repository.add(&command.id, board).await?;
        Ok(())
    }
}

pub struct UpdateBoardNameHandler;

#[async_trait]
impl CommandHandler<UpdateBoardName> for UpdateBoardNameHandler {
    async fn handle(
        &self,
        command: &UpdateBoardName,
        ctx: &CommandHandlingContext,
        _token: &CancellationToken,
    ) -> Result<(), HandlerError> {
        let repository = ctx.repository::<BoardState>();
        let board = repository.get(&command.id).await?;
        let mut board = board.lock().expect("board lock");
        board.update_name(&command.name)?;
        Ok(())
    }
}

pub struct ArchiveBoardHandler;

#[async_trait]
impl CommandHandler<ArchiveBoard> for ArchiveBoardHandler {
    async fn handle(
        &self,
        command: &ArchiveBoard,
        ctx: &CommandHandlingContext,
        _token: &CancellationToken,
    ) -> Result<(), HandlerError> {
        let repository = ctx.repository::<BoardState>();
        let board = repository.get(&command.id).await?;
        let mut board = board.lock().expect("board lock");
        board.archive()?;
        Ok(())
    }
}
