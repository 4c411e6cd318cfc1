//! The trace writer (C2): buffers fixed-schema trace records, transposes
//! and delta-encodes full buffers, and emits them through a
//! [`ContainerWriter`].

use std::io::{Cursor, Seek, Write};

use binrw::BinWrite;
use byteorder::{WriteBytesExt, LE};

use crate::container::ContainerWriter;
use crate::error::{LbtError, LbtResult};
use crate::trace::records::{
    flag, OperationType, TraceRecord, TraceTrailerHeader, CHUNK_RECORD_COUNT,
    FORMAT_EXTENDED_CORE_TRACE, INDEX_SEGMENT_ENTRY_COUNT, MEMORY_IMAGE_CHUNK_SIZE,
    TRACE_TRAILER_SIGNATURE,
};

/// Writes an LBT trace stream, with its backing LBCF container, to the
/// given [writer](Write) + [seeker](Seek).
///
/// Re-use after [`TraceWriter::flush`] is impossible because `flush` takes
/// `self` by value and consumes the underlying container writer with it.
pub struct TraceWriter<F: Write + Seek> {
    container: ContainerWriter<F>,

    memory_size: u64,

    record_buffer: Vec<TraceRecord>,
    chunk_index_segment: Vec<u64>,
    chunk_index_table: Vec<u64>,

    total_record_count: u64,
    total_trace_chunk_count: u64,

    initial_image_index_chunk_number: u64,
    final_image_index_chunk_number: u64,
}

impl<F: Write + Seek> TraceWriter<F> {
    pub fn new(file: F) -> LbtResult<Self> {
        Ok(Self {
            container: ContainerWriter::new(file)?,
            memory_size: 0,
            record_buffer: Vec::with_capacity(CHUNK_RECORD_COUNT),
            chunk_index_segment: Vec::with_capacity(INDEX_SEGMENT_ENTRY_COUNT),
            chunk_index_table: Vec::with_capacity(65536),
            total_record_count: 0,
            total_trace_chunk_count: 0,
            initial_image_index_chunk_number: 0,
            final_image_index_chunk_number: 0,
        })
    }

    /// Must be called once with a non-zero size before any record-adding
    /// call or [`TraceWriter::store_memory_image`].
    pub fn set_memory_size(&mut self, size: u64) -> LbtResult<()> {
        if size == 0 {
            return Err(LbtError::ContractViolation(
                "memory size must be non-zero".into(),
            ));
        }
        self.memory_size = size;
        Ok(())
    }

    fn check_memory_size(&self) -> LbtResult<u64> {
        if self.memory_size == 0 {
            return Err(LbtError::ContractViolation(
                "set_memory_size must be called before adding records".into(),
            ));
        }
        Ok(self.memory_size)
    }

    fn check_address_range(&self, address: u32) -> LbtResult<()> {
        let memory_size = self.check_memory_size()?;
        if address as u64 + 4 > memory_size {
            return Err(LbtError::ContractViolation(format!(
                "address {address} + 4 exceeds memory size {memory_size}"
            )));
        }
        Ok(())
    }

    /// Splits `image` into 64 MiB chunks (the last may be shorter), appends
    /// each as a container chunk, then appends an index chunk listing their
    /// chunk indices.
    pub fn store_memory_image(&mut self, image: &[u8], is_initial: bool) -> LbtResult<()> {
        let memory_size = self.check_memory_size()?;
        if image.len() as u64 != memory_size {
            return Err(LbtError::ContractViolation(format!(
                "image of {} bytes does not match memory size {memory_size}",
                image.len()
            )));
        }

        let chunk_indices: Vec<u64> = image
            .chunks(MEMORY_IMAGE_CHUNK_SIZE)
            .map(|piece| self.container.append_chunk(piece))
            .collect::<LbtResult<_>>()?;

        let mut index_bytes = Vec::with_capacity(chunk_indices.len() * 8);
        for index in &chunk_indices {
            index_bytes.write_u64::<LE>(*index)?;
        }
        let index_chunk = self.container.append_chunk(&index_bytes)?;

        if is_initial {
            self.initial_image_index_chunk_number = index_chunk;
        } else {
            self.final_image_index_chunk_number = index_chunk;
        }
        Ok(())
    }

    fn push_record(&mut self, record: TraceRecord) -> LbtResult<()> {
        if self.record_buffer.len() == CHUNK_RECORD_COUNT {
            self.flush_chunk_buffer()?;
        }
        self.record_buffer.push(record);
        Ok(())
    }

    /// `operation_type` must be [`OperationType::Nop`], `Alu1`, `Alu2`,
    /// `Fetch`, `ScratchpadRead`, `ScratchpadWrite`, `LoadImmediate`, or
    /// `Control` — anything with no associated memory address or side blob.
    #[allow(clippy::too_many_arguments)]
    pub fn add_basic_operation(
        &mut self,
        cycle: u64,
        instruction_address: u32,
        operation_type: OperationType,
        input_channel_1: u8,
        uses_input_channel_1: bool,
        input_channel_2: u8,
        uses_input_channel_2: bool,
        executed: bool,
        end_of_packet: bool,
    ) -> LbtResult<()> {
        self.check_address_range(instruction_address)?;

        let mut flags = 0u8;
        if uses_input_channel_1 {
            flags |= flag::INPUT_CHANNEL_1;
        }
        if uses_input_channel_2 {
            flags |= flag::INPUT_CHANNEL_2;
        }
        if !executed {
            flags |= flag::NOT_EXECUTED;
        }
        if end_of_packet {
            flags |= flag::END_OF_PACKET;
        }

        self.push_record(TraceRecord {
            cycle_number: cycle,
            instruction_address,
            memory_address: 0,
            operation_type: operation_type as u8,
            parameter1: if uses_input_channel_1 { input_channel_1 } else { 0 },
            parameter2: if uses_input_channel_2 { input_channel_2 } else { 0 },
            flags,
            memory_data: 0,
        })
    }

    /// `operation_type` must be one of the load/store variants.
    #[allow(clippy::too_many_arguments)]
    pub fn add_memory_operation(
        &mut self,
        cycle: u64,
        instruction_address: u32,
        operation_type: OperationType,
        memory_address: u32,
        memory_data: u32,
        executed: bool,
        end_of_packet: bool,
    ) -> LbtResult<()> {
        self.check_address_range(instruction_address)?;
        self.check_address_range(memory_address)?;

        let mut flags = 0u8;
        if !executed {
            flags |= flag::NOT_EXECUTED;
        }
        if end_of_packet {
            flags |= flag::END_OF_PACKET;
        }

        self.push_record(TraceRecord {
            cycle_number: cycle,
            instruction_address,
            memory_address,
            operation_type: operation_type as u8,
            parameter1: 0,
            parameter2: 0,
            flags,
            memory_data,
        })
    }

    /// Builds a side blob of `u32 register_count` followed by the register
    /// values then `data`, appends it as a container chunk, and records a
    /// [`OperationType::SystemCall`] record pointing at it. `syscall_number`
    /// is narrowed to 8 bits, matching the on-disk `parameter1` field.
    #[allow(clippy::too_many_arguments)]
    pub fn add_system_call(
        &mut self,
        cycle: u64,
        instruction_address: u32,
        syscall_number: u32,
        register_values: &[u32],
        data: &[u8],
        executed: bool,
        end_of_packet: bool,
    ) -> LbtResult<()> {
        self.check_address_range(instruction_address)?;

        if self.record_buffer.len() == CHUNK_RECORD_COUNT {
            self.flush_chunk_buffer()?;
        }

        let mut blob = Vec::with_capacity(4 + register_values.len() * 4 + data.len());
        blob.write_u32::<LE>(register_values.len() as u32)?;
        for value in register_values {
            blob.write_u32::<LE>(*value)?;
        }
        blob.extend_from_slice(data);

        let syscall_chunk_index = self.container.append_chunk(&blob)?;
        if syscall_chunk_index > 0xFF_FFFF_FFFF {
            return Err(LbtError::ContractViolation(
                "system call chunk index exceeds 40 bits".into(),
            ));
        }

        let mut flags = 0u8;
        if !executed {
            flags |= flag::NOT_EXECUTED;
        }
        if end_of_packet {
            flags |= flag::END_OF_PACKET;
        }

        self.record_buffer.push(TraceRecord {
            cycle_number: cycle,
            instruction_address,
            memory_address: (syscall_chunk_index & 0xFFFF_FFFF) as u32,
            operation_type: OperationType::SystemCall as u8,
            parameter1: syscall_number as u8,
            parameter2: ((syscall_chunk_index >> 32) & 0xFF) as u8,
            flags,
            memory_data: 0,
        });
        Ok(())
    }

    /// Transposes the buffered records into eight parallel columns,
    /// delta-encoding `cycle_number` and `instruction_address` against a
    /// zero baseline, and emits the result as one container chunk.
    fn flush_chunk_buffer(&mut self) -> LbtResult<()> {
        if self.record_buffer.is_empty() {
            return Ok(());
        }

        if self.chunk_index_segment.len() == INDEX_SEGMENT_ENTRY_COUNT {
            self.flush_index_table_segment()?;
        }

        let count = self.record_buffer.len();
        let mut buffer = Vec::with_capacity(TraceRecord::SIZE as usize * count);

        let mut prev_cycle = 0u64;
        let mut prev_instruction_address = 0u32;
        let mut cycles = Vec::with_capacity(count);
        let mut instruction_addresses = Vec::with_capacity(count);
        for record in &self.record_buffer {
            cycles.push(record.cycle_number.wrapping_sub(prev_cycle));
            instruction_addresses
                .push(record.instruction_address.wrapping_sub(prev_instruction_address));
            prev_cycle = record.cycle_number;
            prev_instruction_address = record.instruction_address;
        }

        for value in &cycles {
            buffer.write_u64::<LE>(*value)?;
        }
        for value in &instruction_addresses {
            buffer.write_u32::<LE>(*value)?;
        }
        for record in &self.record_buffer {
            buffer.write_u32::<LE>(record.memory_address)?;
        }
        for record in &self.record_buffer {
            buffer.write_u8(record.operation_type)?;
        }
        for record in &self.record_buffer {
            buffer.write_u8(record.parameter1)?;
        }
        for record in &self.record_buffer {
            buffer.write_u8(record.parameter2)?;
        }
        for record in &self.record_buffer {
            buffer.write_u8(record.flags)?;
        }
        for record in &self.record_buffer {
            buffer.write_u32::<LE>(record.memory_data)?;
        }

        let chunk_index = self.container.append_chunk(&buffer)?;
        self.total_record_count += count as u64;
        self.record_buffer.clear();

        self.chunk_index_segment.push(chunk_index);
        self.total_trace_chunk_count += 1;

        Ok(())
    }

    /// Delta-encodes the pending chunk-index segment in place — each
    /// element against the *original* value of its predecessor, not the
    /// already-overwritten one — then appends it as a container chunk.
    fn flush_index_table_segment(&mut self) -> LbtResult<()> {
        if self.chunk_index_segment.is_empty() {
            return Ok(());
        }

        let mut prev = 0u64;
        for value in &mut self.chunk_index_segment {
            let current = *value;
            *value = current.wrapping_sub(prev);
            prev = current;
        }

        let mut bytes = Vec::with_capacity(self.chunk_index_segment.len() * 8);
        for value in &self.chunk_index_segment {
            bytes.write_u64::<LE>(*value)?;
        }
        let segment_chunk_index = self.container.append_chunk(&bytes)?;
        self.chunk_index_table.push(segment_chunk_index);

        self.chunk_index_segment.clear();
        Ok(())
    }

    /// Finalises the trace: flushes pending buffers, appends the
    /// chunk-index table, writes the trailer header as the container's
    /// user data, and finalises the underlying container.
    pub fn flush(mut self) -> LbtResult<F> {
        if !self.record_buffer.is_empty() {
            self.flush_chunk_buffer()?;
        }
        if !self.chunk_index_segment.is_empty() {
            self.flush_index_table_segment()?;
        }

        let mut index_table_bytes = Vec::with_capacity(self.chunk_index_table.len() * 8);
        for value in &self.chunk_index_table {
            index_table_bytes.write_u64::<LE>(*value)?;
        }
        let index_table_chunk_number = self.container.append_chunk(&index_table_bytes)?;

        let trailer = TraceTrailerHeader {
            signature: TRACE_TRAILER_SIGNATURE,
            format: FORMAT_EXTENDED_CORE_TRACE,
            index_table_chunk_number,
            index_table_entry_count: self.chunk_index_table.len() as u64,
            trace_chunk_count: self.total_trace_chunk_count,
            record_count: self.total_record_count,
            memory_size: self.memory_size,
            initial_image_index_chunk_number: self.initial_image_index_chunk_number,
            final_image_index_chunk_number: self.final_image_index_chunk_number,
        };

        let mut trailer_bytes = Vec::with_capacity(TraceTrailerHeader::SIZE as usize);
        {
            let mut cursor = Cursor::new(&mut trailer_bytes);
            trailer.write_le(&mut cursor).expect("in-memory write cannot fail");
        }
        self.container.set_user_data(&trailer_bytes);

        self.container.flush()
    }
}
