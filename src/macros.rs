/// Agrega una o más instrucciones al final del código generado.
///
/// Los opcodes sin operando se escriben por nombre y las formas con
/// operando se escriben tal cual:
///
/// ```ignore
/// emit!(self, Push(Operand::Int(3)), Oframe);
/// ```
macro_rules! emit {
    (@each $generator:expr, $name:ident ( $($operand:tt)* ) $(, $($rest:tt)+)?) => {{
        $generator.push(crate::ir::Instruction::$name($($operand)*));
        $(emit!(@each $generator, $($rest)+);)?
    }};

    (@each $generator:expr, $opcode:ident $(, $($rest:tt)+)?) => {{
        $generator.push(crate::ir::Instruction::Op(crate::ir::Opcode::$opcode));
        $(emit!(@each $generator, $($rest)+);)?
    }};

    ($generator:expr, $($instruction:tt)+) => {{
        emit!(@each $generator, $($instruction)+);
    }};
}
