use x86_64::instructions::port::Port;

/// Byte and word access to x86 I/O ports.
pub trait PortIo {
    fn inb(&mut self, port: u16) -> u8;
    fn outb(&mut self, port: u16, value: u8);
    fn inw(&mut self, port: u16) -> u16;
    fn outw(&mut self, port: u16, value: u16);
}

impl<P: PortIo + ?Sized> PortIo for &mut P {
    fn inb(&mut self, port: u16) -> u8 {
        (**self).inb(port)
    }

    fn outb(&mut self, port: u16, value: u8) {
        (**self).outb(port, value)
    }

    fn inw(&mut self, port: u16) -> u16 {
        (**self).inw(port)
    }

    fn outw(&mut self, port: u16, value: u16) {
        (**self).outw(port, value)
    }
}

/// Real backend over `in`/`out` instructions.
#[derive(Debug, Clone, Copy)]
pub struct X86PortIo;

impl PortIo for X86PortIo {
    fn inb(&mut self, port: u16) -> u8 {
        unsafe { Port::new(port).read() }
    }

    fn outb(&mut self, port: u16, value: u8) {
        unsafe { Port::new(port).write(value) }
    }

    fn inw(&mut self, port: u16) -> u16 {
        unsafe { Port::new(port).read() }
    }

    fn outw(&mut self, port: u16, value: u16) {
        unsafe { Port::new(port).write(value) }
    }
}
