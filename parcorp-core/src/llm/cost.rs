/// Token counts reported by a backend for one completed call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// USD per token.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TokenRates {
    pub input: f64,
    pub output: f64,
}

impl TokenRates {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }

    pub fn cost(&self, usage: &Usage) -> f64 {
        usage.input_tokens as f64 * self.input + usage.output_tokens as f64 * self.output
    }
}

/// Session spend against a ceiling. Spending stops once `spent > ceiling`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budget {
    ceiling: f64,
    spent: f64,
}

impl Budget {
    pub fn new(ceiling: f64) -> Self {
        Self {
            ceiling,
            spent: 0.0,
        }
    }

    /// Records `cost` and reports whether the ceiling has been passed.
    pub fn charge(&mut self, cost: f64) -> bool {
        self.spent += cost.max(0.0);
        self.is_exceeded()
    }

    pub fn is_exceeded(&self) -> bool {
        self.spent > self.ceiling
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }
}
