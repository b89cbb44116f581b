use std::collections::HashSet;

use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};

pub const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

/// Splits text into lower-cased terms on whitespace and punctuation.
#[derive(Clone)]
pub struct Lexicon {
	analyzer: TextAnalyzer,
}

impl Lexicon {
	pub fn new() -> Self {
		Self { analyzer: TextAnalyzer::builder(SimpleTokenizer::default()).filter(LowerCaser).build() }
	}

	/// Same tokenization, additionally dropping common English stop words.
	pub fn with_stop_words() -> Self {
		let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
			.filter(LowerCaser)
			.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
			.build();
		Self { analyzer }
	}

	pub fn terms(&self, text: &str) -> Vec<String> {
		let mut analyzer = self.analyzer.clone();
		let mut stream = analyzer.token_stream(text);
		let mut out = Vec::new();
		while stream.advance() { out.push(stream.token().text.clone()); }
		out
	}

	pub fn query(&self, text: &str) -> LexicalQuery {
		LexicalQuery { terms: self.terms(text).into_iter().collect() }
	}
}

impl Default for Lexicon {
	fn default() -> Self { Self::new() }
}

/// Distinct query terms, scored against documents by normalized overlap.
#[derive(Debug, Clone, Default)]
pub struct LexicalQuery {
	terms: HashSet<String>,
}

impl LexicalQuery {
	pub fn is_empty(&self) -> bool { self.terms.is_empty() }

	pub fn len(&self) -> usize { self.terms.len() }

	/// Shared distinct terms divided by the number of query terms, in `[0, 1]`.
	pub fn score(&self, lexicon: &Lexicon, text: &str) -> f32 {
		if self.terms.is_empty() { return 0.0; }
		let doc: HashSet<String> = lexicon.terms(text).into_iter().collect();
		let shared = self.terms.iter().filter(|t| doc.contains(*t)).count();
		shared as f32 / self.terms.len() as f32
	}
}
