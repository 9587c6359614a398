use fabric::Codec;

/// Reports which compressed texture families the GPU can sample.
pub trait CodecSupport: Send + Sync {
    fn supports(&self, codec: Codec) -> bool;
}

/// A fixed set of supported codecs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecSet {
    codecs: Vec<Codec>,
}

impl CodecSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self::from_codecs(Codec::PREFERENCE)
    }

    pub fn from_codecs(codecs: impl IntoIterator<Item = Codec>) -> Self {
        let mut set = Self::default();
        for codec in codecs {
            if !set.codecs.contains(&codec) {
                set.codecs.push(codec);
            }
        }
        set
    }

    pub fn codecs(&self) -> &[Codec] {
        &self.codecs
    }
}

impl CodecSupport for CodecSet {
    fn supports(&self, codec: Codec) -> bool {
        self.codecs.contains(&codec)
    }
}

impl<F> CodecSupport for F
where
    F: Fn(Codec) -> bool + Send + Sync,
{
    fn supports(&self, codec: Codec) -> bool {
        self(codec)
    }
}
