//! Opcode palette of the packed 32-bit instruction set.
//!
//! Byte 0 of every word holds `opcode << 2 | submode`. The submode selects a
//! variant inside an opcode family (for example `JCOND` NZ/Z/EQ/NE).

use std::fmt;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop = 0,
    Load = 1,
    Store = 2,
    LoadEx = 3,
    StoreEx = 4,
    Push = 5,
    Pop = 6,
    Mov = 7,
    Cast = 8,
    Jmp = 9,
    JmpGc = 10,
    JCond = 11,
    JCondGc = 12,
    JCondX = 13,
    JCondGcX = 14,
    Call = 15,
    Ret = 16,
    Result = 17,
    Cons = 18,
    MkClos = 19,
    OpIAsmd = 20,
    OpIOnlg = 21,
    OpISren = 22,
    OpRAsmd = 23,
    OpROnlg = 24,
    OpRSren = 25,
    OpSAlgs = 26,
    OpSRen = 27,
    OpLAon = 28,
}

impl Opcode {
    pub const fn from_u6(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Opcode::Nop,
            1 => Opcode::Load,
            2 => Opcode::Store,
            3 => Opcode::LoadEx,
            4 => Opcode::StoreEx,
            5 => Opcode::Push,
            6 => Opcode::Pop,
            7 => Opcode::Mov,
            8 => Opcode::Cast,
            9 => Opcode::Jmp,
            10 => Opcode::JmpGc,
            11 => Opcode::JCond,
            12 => Opcode::JCondGc,
            13 => Opcode::JCondX,
            14 => Opcode::JCondGcX,
            15 => Opcode::Call,
            16 => Opcode::Ret,
            17 => Opcode::Result,
            18 => Opcode::Cons,
            19 => Opcode::MkClos,
            20 => Opcode::OpIAsmd,
            21 => Opcode::OpIOnlg,
            22 => Opcode::OpISren,
            23 => Opcode::OpRAsmd,
            24 => Opcode::OpROnlg,
            25 => Opcode::OpRSren,
            26 => Opcode::OpSAlgs,
            27 => Opcode::OpSRen,
            28 => Opcode::OpLAon,
            _ => return None,
        })
    }

    pub const fn as_u6(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::LoadEx => "loadex",
            Opcode::StoreEx => "storeex",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Mov => "mov",
            Opcode::Cast => "cast",
            Opcode::Jmp => "jmp",
            Opcode::JmpGc => "jmpgc",
            Opcode::JCond => "jcond",
            Opcode::JCondGc => "jcondgc",
            Opcode::JCondX => "jcondx",
            Opcode::JCondGcX => "jcondgcx",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Result => "result",
            Opcode::Cons => "cons",
            Opcode::MkClos => "mkclos",
            Opcode::OpIAsmd => "opiasmd",
            Opcode::OpIOnlg => "opionlg",
            Opcode::OpISren => "opisren",
            Opcode::OpRAsmd => "oprasmd",
            Opcode::OpROnlg => "opronlg",
            Opcode::OpRSren => "oprsren",
            Opcode::OpSAlgs => "opsalgs",
            Opcode::OpSRen => "opsren",
            Opcode::OpLAon => "oplaon",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// PUSH / POP submodes.
pub const MODE_PUSH_RESERVE: u8 = 0;
pub const MODE_PUSH_CONST: u8 = 1;
pub const MODE_PUSH_REG: u8 = 2;
pub const MODE_PUSH_CONST_EX: u8 = 3;
pub const MODE_POP_N: u8 = 0;
pub const MODE_POP_STATIC: u8 = 1;
pub const MODE_POP_REG: u8 = 2;
pub const MODE_POP_STATIC_EX: u8 = 3;

// MOV submodes.
pub const MODE_MOV_LOAD: u8 = 0;
pub const MODE_MOV_STORE: u8 = 1;

// RET / MKCLOS submodes.
pub const MODE_RET: u8 = 0;
pub const MODE_RET_N: u8 = 1;
pub const MODE_MKCLOS: u8 = 0;
pub const MODE_MKCLOS_EX: u8 = 1;

/// Value conversions carried by `CAST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    IntToReal,
    IntToStr,
    RealToInt,
    RealToStr,
}

impl CastKind {
    pub const fn mode(self) -> u8 {
        match self {
            CastKind::IntToReal => 0,
            CastKind::IntToStr => 1,
            CastKind::RealToInt => 2,
            CastKind::RealToStr => 3,
        }
    }

    pub const fn from_mode(mode: u8) -> Self {
        match mode & 0b11 {
            0 => CastKind::IntToReal,
            1 => CastKind::IntToStr,
            2 => CastKind::RealToInt,
            _ => CastKind::RealToStr,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            CastKind::IntToReal => "itor",
            CastKind::IntToStr => "itos",
            CastKind::RealToInt => "rtoi",
            CastKind::RealToStr => "rtos",
        }
    }
}

/// Condition tested by the `JCOND` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondKind {
    NotZero,
    Zero,
    Equal,
    NotEqual,
}

impl CondKind {
    pub const fn mode(self) -> u8 {
        match self {
            CondKind::NotZero => 0,
            CondKind::Zero => 1,
            CondKind::Equal => 2,
            CondKind::NotEqual => 3,
        }
    }

    pub const fn from_mode(mode: u8) -> Self {
        match mode & 0b11 {
            0 => CondKind::NotZero,
            1 => CondKind::Zero,
            2 => CondKind::Equal,
            _ => CondKind::NotEqual,
        }
    }

    /// Two-register conditions only have an 8-bit distance field.
    pub const fn is_binary(self) -> bool {
        matches!(self, CondKind::Equal | CondKind::NotEqual)
    }

    /// Largest distance the compact (non-extended) form can carry.
    pub const fn compact_limit(self) -> u32 {
        if self.is_binary() { u8::MAX as u32 } else { u16::MAX as u32 }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            CondKind::NotZero => "jnz",
            CondKind::Zero => "jz",
            CondKind::Equal => "jeq",
            CondKind::NotEqual => "jneq",
        }
    }
}

/// How `CALL` interprets its target register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallMode {
    /// Script function, no dynamic checks.
    Script,
    /// Plain native function pointer.
    Native,
    /// JIT-compiled function.
    Jit,
    /// Whatever callable the register holds, closures included.
    Dynamic,
}

impl CallMode {
    pub const fn mode(self) -> u8 {
        match self {
            CallMode::Script => 0,
            CallMode::Native => 1,
            CallMode::Jit => 2,
            CallMode::Dynamic => 3,
        }
    }

    pub const fn from_mode(mode: u8) -> Self {
        match mode & 0b11 {
            0 => CallMode::Script,
            1 => CallMode::Native,
            2 => CallMode::Jit,
            _ => CallMode::Dynamic,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            CallMode::Script => "callnwo",
            CallMode::Native => "callnfp",
            CallMode::Jit => "callnjit",
            CallMode::Dynamic => "call",
        }
    }
}

/// Container built by `CONS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsKind {
    Array,
    Map,
    Struct,
}

impl ConsKind {
    pub const fn mode(self) -> u8 {
        match self {
            ConsKind::Array => 0,
            ConsKind::Map => 1,
            ConsKind::Struct => 2,
        }
    }

    pub const fn from_mode(mode: u8) -> Option<Self> {
        match mode & 0b11 {
            0 => Some(ConsKind::Array),
            1 => Some(ConsKind::Map),
            2 => Some(ConsKind::Struct),
            _ => None,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            ConsKind::Array => "mkarr",
            ConsKind::Map => "mkmap",
            ConsKind::Struct => "mkstruct",
        }
    }
}

/// Every arithmetic, comparison and logical operator, grouped into the
/// opcode families that carry them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    AddI,
    SubI,
    MulI,
    DivI,
    ModI,
    NegI,
    LtI,
    GtI,
    EltI,
    EgtI,
    EqI,
    NeqI,
    AddR,
    SubR,
    MulR,
    DivR,
    ModR,
    NegR,
    LtR,
    GtR,
    EltR,
    EgtR,
    EqR,
    NeqR,
    AddS,
    LtS,
    GtS,
    EltS,
    EgtS,
    EqS,
    NeqS,
    And,
    Or,
    Not,
}

impl Operator {
    pub const ALL: [Operator; 34] = [
        Operator::AddI,
        Operator::SubI,
        Operator::MulI,
        Operator::DivI,
        Operator::ModI,
        Operator::NegI,
        Operator::LtI,
        Operator::GtI,
        Operator::EltI,
        Operator::EgtI,
        Operator::EqI,
        Operator::NeqI,
        Operator::AddR,
        Operator::SubR,
        Operator::MulR,
        Operator::DivR,
        Operator::ModR,
        Operator::NegR,
        Operator::LtR,
        Operator::GtR,
        Operator::EltR,
        Operator::EgtR,
        Operator::EqR,
        Operator::NeqR,
        Operator::AddS,
        Operator::LtS,
        Operator::GtS,
        Operator::EltS,
        Operator::EgtS,
        Operator::EqS,
        Operator::NeqS,
        Operator::And,
        Operator::Or,
        Operator::Not,
    ];

    pub const fn encoding(self) -> (Opcode, u8) {
        use Operator::*;
        match self {
            AddI => (Opcode::OpIAsmd, 0),
            SubI => (Opcode::OpIAsmd, 1),
            MulI => (Opcode::OpIAsmd, 2),
            DivI => (Opcode::OpIAsmd, 3),
            ModI => (Opcode::OpIOnlg, 0),
            NegI => (Opcode::OpIOnlg, 1),
            LtI => (Opcode::OpIOnlg, 2),
            GtI => (Opcode::OpIOnlg, 3),
            EltI => (Opcode::OpISren, 0),
            EgtI => (Opcode::OpISren, 1),
            EqI => (Opcode::OpISren, 2),
            NeqI => (Opcode::OpISren, 3),
            AddR => (Opcode::OpRAsmd, 0),
            SubR => (Opcode::OpRAsmd, 1),
            MulR => (Opcode::OpRAsmd, 2),
            DivR => (Opcode::OpRAsmd, 3),
            ModR => (Opcode::OpROnlg, 0),
            NegR => (Opcode::OpROnlg, 1),
            LtR => (Opcode::OpROnlg, 2),
            GtR => (Opcode::OpROnlg, 3),
            EltR => (Opcode::OpRSren, 0),
            EgtR => (Opcode::OpRSren, 1),
            EqR => (Opcode::OpRSren, 2),
            NeqR => (Opcode::OpRSren, 3),
            AddS => (Opcode::OpSAlgs, 0),
            LtS => (Opcode::OpSAlgs, 1),
            GtS => (Opcode::OpSAlgs, 2),
            EltS => (Opcode::OpSAlgs, 3),
            EgtS => (Opcode::OpSRen, 0),
            EqS => (Opcode::OpSRen, 1),
            NeqS => (Opcode::OpSRen, 2),
            And => (Opcode::OpLAon, 0),
            Or => (Opcode::OpLAon, 1),
            Not => (Opcode::OpLAon, 2),
        }
    }

    pub const fn from_encoding(opcode: Opcode, mode: u8) -> Option<Self> {
        use Operator::*;
        const FAMILIES: [[Option<Operator>; 4]; 9] = [
            [Some(AddI), Some(SubI), Some(MulI), Some(DivI)],
            [Some(ModI), Some(NegI), Some(LtI), Some(GtI)],
            [Some(EltI), Some(EgtI), Some(EqI), Some(NeqI)],
            [Some(AddR), Some(SubR), Some(MulR), Some(DivR)],
            [Some(ModR), Some(NegR), Some(LtR), Some(GtR)],
            [Some(EltR), Some(EgtR), Some(EqR), Some(NeqR)],
            [Some(AddS), Some(LtS), Some(GtS), Some(EltS)],
            [Some(EgtS), Some(EqS), Some(NeqS), None],
            [Some(And), Some(Or), Some(Not), None],
        ];
        let raw = opcode.as_u6();
        if raw < Opcode::OpIAsmd.as_u6() || raw > Opcode::OpLAon.as_u6() {
            return None;
        }
        FAMILIES[(raw - Opcode::OpIAsmd.as_u6()) as usize][(mode & 0b11) as usize]
    }

    pub const fn is_unary(self) -> bool {
        matches!(self, Operator::NegI | Operator::NegR | Operator::Not)
    }

    pub const fn mnemonic(self) -> &'static str {
        use Operator::*;
        match self {
            AddI => "addi",
            SubI => "subi",
            MulI => "muli",
            DivI => "divi",
            ModI => "modi",
            NegI => "negi",
            LtI => "lti",
            GtI => "gti",
            EltI => "elti",
            EgtI => "egti",
            EqI => "eqi",
            NeqI => "neqi",
            AddR => "addr",
            SubR => "subr",
            MulR => "mulr",
            DivR => "divr",
            ModR => "modr",
            NegR => "negr",
            LtR => "ltr",
            GtR => "gtr",
            EltR => "eltr",
            EgtR => "egtr",
            EqR => "eqr",
            NeqR => "neqr",
            AddS => "adds",
            LtS => "lts",
            GtS => "gts",
            EltS => "elts",
            EgtS => "egts",
            EqS => "eqs",
            NeqS => "neqs",
            And => "land",
            Or => "lor",
            Not => "lnot",
        }
    }
}
