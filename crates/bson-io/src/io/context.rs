//! The nesting stack shared by every reader and writer.

use log::trace;

use crate::BsonError;

/// Kind of construct a frame stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextType {
    TopLevel,
    Document,
    Array,
    /// The code-with-scope value itself, between its code and its scope.
    JavaScriptWithScope,
    ScopeDocument,
}

/// Per-encoding frame data; each reader and writer brings its own.
pub(crate) trait Frame: Clone {
    fn context_type(&self) -> ContextType;
}

/// A stack of frames that always has a top-level frame at the bottom.
///
/// Cloning the stack is how bookmarks snapshot it.
#[derive(Debug, Clone)]
pub(crate) struct ContextStack<F> {
    frames: Vec<F>,
}

impl<F: Frame> ContextStack<F> {
    pub fn new(top_level: F) -> Self {
        Self {
            frames: vec![top_level],
        }
    }

    pub fn push(&mut self, frame: F) {
        trace!(
            "push {:?} context at depth {}",
            frame.context_type(),
            self.frames.len()
        );
        self.frames.push(frame);
    }

    /// Pops the current frame. The top-level frame is never popped.
    pub fn pop(&mut self) -> Result<F, BsonError> {
        if self.frames.len() <= 1 {
            return Err(BsonError::invalid_operation(
                "There is no open document or array to close.",
            ));
        }
        let frame = self.frames.pop().ok_or_else(|| {
            BsonError::invalid_operation("There is no open document or array to close.")
        })?;
        trace!(
            "pop {:?} context at depth {}",
            frame.context_type(),
            self.frames.len()
        );
        Ok(frame)
    }

    pub fn current(&self) -> &F {
        // new() seeds one frame and pop() never removes it
        &self.frames[self.frames.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut F {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn context_type(&self) -> ContextType {
        self.current().context_type()
    }

    /// Number of open frames above the top level.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct TestFrame(ContextType);

    impl Frame for TestFrame {
        fn context_type(&self) -> ContextType {
            self.0
        }
    }

    #[test]
    fn push_and_pop_track_depth() {
        let mut stack = ContextStack::new(TestFrame(ContextType::TopLevel));
        assert_eq!(stack.depth(), 0);
        stack.push(TestFrame(ContextType::Document));
        stack.push(TestFrame(ContextType::Array));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.context_type(), ContextType::Array);
        assert_eq!(stack.pop().unwrap(), TestFrame(ContextType::Array));
        assert_eq!(stack.context_type(), ContextType::Document);
    }

    #[test]
    fn top_level_is_never_popped() {
        let mut stack = ContextStack::new(TestFrame(ContextType::TopLevel));
        assert!(matches!(stack.pop(), Err(BsonError::InvalidOperation(_))));
        assert_eq!(stack.context_type(), ContextType::TopLevel);
    }

    #[test]
    fn clones_are_independent_snapshots() {
        let mut stack = ContextStack::new(TestFrame(ContextType::TopLevel));
        stack.push(TestFrame(ContextType::Document));
        let snapshot = stack.clone();
        stack.pop().unwrap();
        assert_eq!(snapshot.depth(), 1);
        assert_eq!(stack.depth(), 0);
    }
}
