use chatstream_transport::StreamTarget;

use crate::chat::surface::{ChatSurface, EntryHandle, EntryKind, EntryView};

/// Lifecycle of the single in-progress assistant entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RendererState {
    #[default]
    Idle,
    Accumulating {
        target: StreamTarget,
        buffer: String,
        handle: EntryHandle,
    },
}

impl RendererState {
    pub fn active_target(&self) -> Option<StreamTarget> {
        match self {
            Self::Accumulating { target, .. } => Some(*target),
            Self::Idle => None,
        }
    }
}

/// Rejection reason for stream input the renderer cannot apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererRejection {
    NoActiveStream,
    TargetMismatch {
        active: StreamTarget,
        attempted: StreamTarget,
    },
}

/// Accumulates streamed chunks into one surface entry and re-renders it.
#[derive(Debug, Default)]
pub struct StreamingRenderer {
    state: RendererState,
}

impl StreamingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RendererState {
        &self.state
    }

    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, RendererState::Accumulating { .. })
    }

    /// Current buffer content, empty while idle.
    pub fn buffer(&self) -> &str {
        match &self.state {
            RendererState::Accumulating { buffer, .. } => buffer,
            RendererState::Idle => "",
        }
    }

    /// Appends one chunk, creating the placeholder entry on the first chunk.
    pub fn push_chunk<S>(
        &mut self,
        target: StreamTarget,
        chunk: &str,
        surface: &mut S,
    ) -> Result<(), RendererRejection>
    where
        S: ChatSurface + ?Sized,
    {
        if let RendererState::Accumulating {
            target: active,
            buffer,
            handle,
        } = &mut self.state
        {
            if *active != target {
                return Err(RendererRejection::TargetMismatch {
                    active: *active,
                    attempted: target,
                });
            }

            buffer.push_str(chunk);
            surface.update_entry(*handle, EntryView::new(EntryKind::Assistant, buffer.clone()));
            return Ok(());
        }

        let handle = surface.push_entry(EntryView::new(EntryKind::Assistant, chunk));
        self.state = RendererState::Accumulating {
            target,
            buffer: chunk.to_string(),
            handle,
        };
        Ok(())
    }

    /// Ends the stream for `target`, returning the accumulated content.
    pub fn finish<S>(
        &mut self,
        target: StreamTarget,
        surface: &mut S,
    ) -> Result<String, RendererRejection>
    where
        S: ChatSurface + ?Sized,
    {
        match self.state.active_target() {
            None => Err(RendererRejection::NoActiveStream),
            Some(active) if active != target => Err(RendererRejection::TargetMismatch {
                active,
                attempted: target,
            }),
            Some(_) => Ok(self.take(surface).unwrap_or_default()),
        }
    }

    /// Stops the stream whatever its target, keeping the partial content.
    pub fn interrupt<S>(&mut self, surface: &mut S) -> Option<String>
    where
        S: ChatSurface + ?Sized,
    {
        self.take(surface)
    }

    /// Drops the stream and its buffer without committing anything.
    pub fn abandon(&mut self) {
        if let RendererState::Accumulating { target, buffer, .. } = &self.state {
            tracing::debug!(stream_target = ?target, discarded = buffer.len(), "abandoning stream");
        }
        self.state = RendererState::Idle;
    }

    fn take<S>(&mut self, surface: &mut S) -> Option<String>
    where
        S: ChatSurface + ?Sized,
    {
        match std::mem::take(&mut self.state) {
            RendererState::Accumulating { buffer, handle, .. } => {
                surface.finish_entry(handle);
                Some(buffer)
            }
            RendererState::Idle => None,
        }
    }
}
