//! Typed register-combiner ("TEV") programs and their script format.
//!
//! A TEV program encodes the fixed-function combiner equation
//! `output = (d OP (a*(1-c) + b*c) + bias) * scale` for color and alpha,
//! with per-stage input selection. Programs are described in a small
//! block script; unknown tokens warn and fall back to documented
//! defaults so a partially wrong script still produces a usable program.

use std::collections::HashMap;

use log::{info, warn};

/// Highest combiner stage index the hardware supports.
pub const MAX_TEV_STAGES: usize = 16;

/// Combiner operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TevOp {
    /// Add the operands.
    #[default]
    Add,
    /// Subtract the operands.
    Sub,
    /// Compare red channel, greater-than.
    CompRGt,
    /// Compare red channel, equal.
    CompREq,
    /// Compare green+red as 16 bit, greater-than.
    CompGrGt,
    /// Compare green+red as 16 bit, equal.
    CompGrEq,
    /// Compare blue+green+red as 24 bit, greater-than.
    CompBgrGt,
    /// Compare blue+green+red as 24 bit, equal.
    CompBgrEq,
    /// Compare RGB per channel, greater-than.
    CompRgbGt,
    /// Compare RGB per channel, equal.
    CompRgbEq,
    /// Compare alpha, greater-than.
    CompAGt,
    /// Compare alpha, equal.
    CompAEq,
}

impl TevOp {
    fn parse(token: &str) -> Self {
        match token {
            "add" => Self::Add,
            "sub" => Self::Sub,
            "comp_R_gt" => Self::CompRGt,
            "comp_R_eq" => Self::CompREq,
            "comp_GR_gt" => Self::CompGrGt,
            "comp_GR_eq" => Self::CompGrEq,
            "comp_BGR_gt" => Self::CompBgrGt,
            "comp_BGR_eq" => Self::CompBgrEq,
            "comp_RGB_gt" => Self::CompRgbGt,
            "comp_RGB_eq" => Self::CompRgbEq,
            "comp_A_gt" => Self::CompAGt,
            "comp_A_eq" => Self::CompAEq,
            _ => {
                warn!("invalid tev operation {token:?}, using add");
                Self::Add
            }
        }
    }
}

/// Combiner bias term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TevBias {
    /// No bias.
    #[default]
    Zero,
    /// Add one half.
    AddHalf,
    /// Subtract one half.
    SubHalf,
}

impl TevBias {
    fn parse(token: &str) -> Self {
        match token {
            "zero" => Self::Zero,
            "addHalf" => Self::AddHalf,
            "subHalf" => Self::SubHalf,
            _ => {
                warn!("invalid tev bias {token:?}, using zero");
                Self::Zero
            }
        }
    }
}

/// Combiner output scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TevScale {
    /// Scale by 1.
    #[default]
    One,
    /// Scale by 2.
    Two,
    /// Scale by 4.
    Four,
    /// Divide by 2.
    Half,
}

impl TevScale {
    fn parse(token: &str) -> Self {
        match token.parse::<f32>() {
            Ok(v) if v == 1.0 => Self::One,
            Ok(v) if v == 2.0 => Self::Two,
            Ok(v) if v == 4.0 => Self::Four,
            Ok(v) if v == 0.5 => Self::Half,
            _ => {
                warn!("invalid tev scale {token:?}, using 1");
                Self::One
            }
        }
    }
}

/// Clamp comparison mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TevClampMode {
    /// Linear clamp.
    #[default]
    Linear,
    /// Greater-or-equal clamp.
    Great,
    /// Equality clamp.
    Equal,
    /// Less-or-equal clamp.
    Less,
}

impl TevClampMode {
    fn parse(token: &str) -> Self {
        match token {
            "linear" => Self::Linear,
            "great" => Self::Great,
            "equal" => Self::Equal,
            "less" => Self::Less,
            _ => {
                warn!("invalid tev clamp mode {token:?}, using linear");
                Self::Linear
            }
        }
    }
}

/// Combiner output register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TevOutput {
    /// Register 0.
    Reg0,
    /// Register 1.
    Reg1,
    /// Register 2.
    Reg2,
    /// The "previous stage" register.
    #[default]
    RegPrev,
}

impl TevOutput {
    fn parse(token: &str) -> Self {
        match token {
            "reg0" => Self::Reg0,
            "reg1" => Self::Reg1,
            "reg2" => Self::Reg2,
            "regPrev" => Self::RegPrev,
            _ => {
                warn!("invalid tev output {token:?}, using regPrev");
                Self::RegPrev
            }
        }
    }
}

/// Color combiner input selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TevColorIn {
    /// Constant one.
    One,
    /// Constant one half.
    Half,
    /// Constant one quarter.
    Quarter,
    /// Constant zero.
    Zero,
    /// Color register 0.
    C0,
    /// Color register 1.
    C1,
    /// Color register 2.
    C2,
    /// Alpha of register 0.
    A0,
    /// Alpha of register 1.
    A1,
    /// Alpha of register 2.
    A2,
    /// Texture color.
    TextureColor,
    /// Texture alpha.
    TextureAlpha,
    /// Rasterized (vertex) color.
    RasterizedColor,
    /// Rasterized (vertex) alpha.
    RasterizedAlpha,
    /// Previous stage color.
    #[default]
    PreviousColor,
    /// Previous stage alpha.
    PreviousAlpha,
}

impl TevColorIn {
    fn parse(token: &str) -> Self {
        match token {
            "colorOne" => Self::One,
            "colorHalf" => Self::Half,
            "colorQuarter" => Self::Quarter,
            "colorZero" | "alphaZero" => Self::Zero,
            "colorC0" => Self::C0,
            "colorC1" => Self::C1,
            "colorC2" => Self::C2,
            "alphaC0" => Self::A0,
            "alphaC1" => Self::A1,
            "alphaC2" => Self::A2,
            "textureColor" => Self::TextureColor,
            "textureAlpha" => Self::TextureAlpha,
            "rasterizedColor" => Self::RasterizedColor,
            "rasterizedAlpha" => Self::RasterizedAlpha,
            "colorPrevious" | "previousColor" => Self::PreviousColor,
            "alphaPrevious" | "previousAlpha" => Self::PreviousAlpha,
            _ => {
                warn!("invalid tev color input {token:?}, using previous color");
                Self::PreviousColor
            }
        }
    }
}

/// Alpha combiner input selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TevAlphaIn {
    /// Previous stage alpha.
    #[default]
    PreviousAlpha,
    /// Alpha of register 0.
    A0,
    /// Alpha of register 1.
    A1,
    /// Alpha of register 2.
    A2,
    /// Texture alpha.
    TextureAlpha,
    /// Rasterized (vertex) alpha.
    RasterizedAlpha,
    /// Constant zero.
    Zero,
}

impl TevAlphaIn {
    fn parse(token: &str) -> Self {
        match token {
            "previousAlpha" => Self::PreviousAlpha,
            "alphaC0" => Self::A0,
            "alphaC1" => Self::A1,
            "alphaC2" => Self::A2,
            "textureAlpha" => Self::TextureAlpha,
            "rasterizedAlpha" => Self::RasterizedAlpha,
            "alphaZero" => Self::Zero,
            _ => {
                warn!("invalid tev alpha input {token:?}, using previous alpha");
                Self::PreviousAlpha
            }
        }
    }
}

/// The op/bias/scale/clamp/output half of a combiner equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TevOpSettings {
    /// Operation.
    pub op: TevOp,
    /// Bias term.
    pub bias: TevBias,
    /// Output scale.
    pub scale: TevScale,
    /// Whether the output clamps.
    pub clamp: bool,
    /// Clamp comparison mode.
    pub clamp_mode: TevClampMode,
    /// Output register.
    pub output: TevOutput,
}

/// Input selection for one combiner stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TevStage {
    /// Color inputs a, b, c, d.
    pub color_in: [TevColorIn; 4],
    /// Alpha inputs a, b, c, d.
    pub alpha_in: [TevAlphaIn; 4],
}

/// A complete combiner program: shared op settings plus a general stage
/// and optional per-stage input overrides.
#[derive(Debug, Clone, Default)]
pub struct TevProgram {
    /// Color equation settings, shared by every stage.
    pub color_op: TevOpSettings,
    /// Alpha equation settings, shared by every stage.
    pub alpha_op: TevOpSettings,
    general_stage: TevStage,
    custom_stages: HashMap<usize, TevStage>,
}

impl TevProgram {
    /// Create a program with default stages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a stage. `index` of `None` sets the general stage used
    /// by every stage lacking a custom entry.
    pub fn push_stage(&mut self, stage: TevStage, index: Option<usize>) {
        match index {
            None => self.general_stage = stage,
            Some(i) => {
                info!("custom tev stage {i} added");
                self.custom_stages.insert(i, stage);
            }
        }
    }

    /// The stage configuration used for hardware stage `index`.
    pub fn stage(&self, index: usize) -> &TevStage {
        self.custom_stages.get(&index).unwrap_or(&self.general_stage)
    }

    /// Number of custom stage overrides.
    pub fn custom_stage_count(&self) -> usize {
        self.custom_stages.len()
    }
}

/// Named collection of combiner programs.
#[derive(Debug, Default)]
pub struct TevLibrary {
    programs: HashMap<String, TevProgram>,
}

impl TevLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a program by name.
    pub fn get(&self, name: &str) -> Option<&TevProgram> {
        self.programs.get(name)
    }

    /// Remove a program by name.
    pub fn remove(&mut self, name: &str) -> Option<TevProgram> {
        self.programs.remove(name)
    }

    /// Number of programs in the library.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// True when the library holds no programs.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Parse a script, adding every `tev <name> { .. }` block.
    /// A name that already exists is skipped with a warning.
    pub fn parse_script(&mut self, source: &str) {
        let tokens = tokenize(source);
        let mut cursor = tokens.iter().map(String::as_str).peekable();

        while let Some(token) = cursor.next() {
            if token != "tev" {
                continue;
            }
            let Some(name) = cursor.next() else { break };

            if self.programs.contains_key(name) {
                warn!("tev {name} already exists, skipping redefinition");
                skip_block(&mut cursor);
                continue;
            }

            info!("parsing tev {name}");
            let program = parse_program(&mut cursor);
            self.programs.insert(name.to_owned(), program);
        }
    }
}

fn tokenize(source: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in source.split_whitespace() {
        let mut word = String::new();
        for ch in raw.chars() {
            if ch == '{' || ch == '}' {
                if !word.is_empty() {
                    tokens.push(std::mem::take(&mut word));
                }
                tokens.push(ch.to_string());
            } else {
                word.push(ch);
            }
        }
        if !word.is_empty() {
            tokens.push(word);
        }
    }
    tokens
}

/// Consume a balanced `{ .. }` block, including the opening brace.
fn skip_block<'a, I>(cursor: &mut std::iter::Peekable<I>)
where
    I: Iterator<Item = &'a str>,
{
    let mut depth = 0;
    for token in cursor.by_ref() {
        match token {
            "{" => depth += 1,
            "}" => {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
            _ => {}
        }
    }
}

fn parse_program<'a, I>(cursor: &mut std::iter::Peekable<I>) -> TevProgram
where
    I: Iterator<Item = &'a str>,
{
    let mut program = TevProgram::new();

    // Opening brace of the tev block.
    if cursor.next() != Some("{") {
        warn!("tev block missing opening brace");
        return program;
    }

    let mut depth = 1;
    while depth > 0 {
        let Some(token) = cursor.next() else { break };
        match token {
            "{" => depth += 1,
            "}" => depth -= 1,
            "stage" => {
                let index = match cursor.next() {
                    Some("all") => None,
                    Some(num) => Some(num.parse::<i64>().unwrap_or(0)),
                    None => break,
                };
                parse_stage(&mut program, cursor, index);
            }
            "tevColorOp" | "tevAlphaOp" => {
                let settings = parse_op_settings(cursor);
                if token == "tevColorOp" {
                    program.color_op = settings;
                } else {
                    program.alpha_op = settings;
                }
            }
            _ => {}
        }
    }

    program
}

fn parse_op_settings<'a, I>(cursor: &mut std::iter::Peekable<I>) -> TevOpSettings
where
    I: Iterator<Item = &'a str>,
{
    let mut next = || cursor.next().unwrap_or("");
    TevOpSettings {
        op: TevOp::parse(next()),
        bias: TevBias::parse(next()),
        scale: TevScale::parse(next()),
        clamp: next() == "true",
        clamp_mode: TevClampMode::parse(next()),
        output: TevOutput::parse(next()),
    }
}

fn parse_stage<'a, I>(
    program: &mut TevProgram,
    cursor: &mut std::iter::Peekable<I>,
    index: Option<i64>,
)
where
    I: Iterator<Item = &'a str>,
{
    // Hardware supports 16 stages; anything above is a script error.
    if let Some(i) = index {
        if i >= MAX_TEV_STAGES as i64 || i < 0 {
            warn!("invalid tev stage number {i}, skipping block");
            skip_block(cursor);
            return;
        }
    }

    let mut stage = TevStage::default();

    if cursor.next() != Some("{") {
        warn!("tev stage block missing opening brace");
        return;
    }

    let mut depth = 1;
    while depth > 0 {
        let Some(token) = cursor.next() else { break };
        match token {
            "{" => depth += 1,
            "}" => depth -= 1,
            "tevColorABCD" => {
                for slot in &mut stage.color_in {
                    *slot = TevColorIn::parse(cursor.next().unwrap_or(""));
                }
            }
            "tevAlphaABCD" => {
                for slot in &mut stage.alpha_in {
                    *slot = TevAlphaIn::parse(cursor.next().unwrap_or(""));
                }
            }
            _ => {}
        }
    }

    program.push_stage(stage, index.map(|i| i as usize));
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
        tev water {
            stage all {
                tevColorABCD textureColor colorZero rasterizedColor previousColor
                tevAlphaABCD textureAlpha alphaZero rasterizedAlpha previousAlpha
            }
            stage 1 {
                tevColorABCD colorC0 colorOne colorHalf colorPrevious
            }
            tevColorOp add addHalf 2 true linear reg0
            tevAlphaOp sub zero 0.5 false less regPrev
        }
    "#;

    #[test]
    fn parses_general_and_custom_stages() {
        let mut lib = TevLibrary::new();
        lib.parse_script(SCRIPT);

        let prog = lib.get("water").unwrap();
        assert_eq!(prog.custom_stage_count(), 1);

        let general = prog.stage(0);
        assert_eq!(general.color_in[0], TevColorIn::TextureColor);
        assert_eq!(general.alpha_in[1], TevAlphaIn::Zero);

        let custom = prog.stage(1);
        assert_eq!(custom.color_in[0], TevColorIn::C0);
        // Alpha inputs untouched by the custom block keep defaults.
        assert_eq!(custom.alpha_in[0], TevAlphaIn::PreviousAlpha);
    }

    #[test]
    fn parses_op_settings() {
        let mut lib = TevLibrary::new();
        lib.parse_script(SCRIPT);

        let prog = lib.get("water").unwrap();
        assert_eq!(prog.color_op.op, TevOp::Add);
        assert_eq!(prog.color_op.bias, TevBias::AddHalf);
        assert_eq!(prog.color_op.scale, TevScale::Two);
        assert!(prog.color_op.clamp);
        assert_eq!(prog.color_op.output, TevOutput::Reg0);

        assert_eq!(prog.alpha_op.op, TevOp::Sub);
        assert_eq!(prog.alpha_op.scale, TevScale::Half);
        assert!(!prog.alpha_op.clamp);
        assert_eq!(prog.alpha_op.clamp_mode, TevClampMode::Less);
    }

    #[test]
    fn unknown_tokens_fall_back_to_defaults() {
        let script = r#"
            tev broken {
                stage all {
                    tevColorABCD bogus bogus bogus bogus
                }
                tevColorOp frobnicate wat 3 true diagonal regNope
            }
        "#;
        let mut lib = TevLibrary::new();
        lib.parse_script(script);

        let prog = lib.get("broken").unwrap();
        assert_eq!(prog.stage(0).color_in[0], TevColorIn::PreviousColor);
        assert_eq!(prog.color_op.op, TevOp::Add);
        assert_eq!(prog.color_op.bias, TevBias::Zero);
        assert_eq!(prog.color_op.scale, TevScale::One);
        assert_eq!(prog.color_op.clamp_mode, TevClampMode::Linear);
        assert_eq!(prog.color_op.output, TevOutput::RegPrev);
    }

    #[test]
    fn out_of_range_stage_is_skipped() {
        let script = r#"
            tev big {
                stage 40 {
                    tevColorABCD colorC0 colorC1 colorC2 colorZero
                }
            }
        "#;
        let mut lib = TevLibrary::new();
        lib.parse_script(script);

        let prog = lib.get("big").unwrap();
        assert_eq!(prog.custom_stage_count(), 0);
        assert_eq!(prog.stage(0).color_in[0], TevColorIn::PreviousColor);
    }

    #[test]
    fn duplicate_names_keep_first_definition() {
        let script = r#"
            tev dup { tevColorOp sub zero 1 true linear reg1 }
            tev dup { tevColorOp add zero 1 true linear reg2 }
        "#;
        let mut lib = TevLibrary::new();
        lib.parse_script(script);
        assert_eq!(lib.len(), 1);
        assert_eq!(lib.get("dup").unwrap().color_op.output, TevOutput::Reg1);
    }
}
