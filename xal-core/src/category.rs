/// A named gain/streaming group sounds are created into. Matches
/// `Category` in spec.md §3: `streamed` only advises `SoundBuffer::load`
/// which strategy to pick when a caller doesn't force one explicitly.
#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub gain: f32,
    pub streamed: bool,
}

impl Category {
    pub fn new(name: impl Into<String>, streamed: bool) -> Self {
        Self {
            name: name.into(),
            gain: 1.0,
            streamed,
        }
    }
}
